use crate::errors::{ApiError, ServiceError};
use crate::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Success envelope without a payload, used by deletes
pub fn deleted_response() -> Response {
    (StatusCode::OK, Json(ApiResponse::<()>::empty())).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

fn validate_positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Quantity must be greater than 0".into());
        Err(err)
    }
}

/// Body for adding a composition line
#[derive(Debug, Deserialize, Validate)]
pub struct AddComponentRequest {
    #[validate(range(min = 1))]
    pub component_id: i32,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
}

/// Body for changing a composition line's quantity
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), false)]
    #[case(dec!(-2.5), false)]
    #[case(dec!(0.0001), true)]
    #[case(dec!(3), true)]
    fn line_quantity_must_be_positive(#[case] quantity: Decimal, #[case] valid: bool) {
        let add = AddComponentRequest {
            component_id: 1,
            quantity,
        };
        assert_eq!(add.validate().is_ok(), valid);
        assert_eq!(UpdateQuantityRequest { quantity }.validate().is_ok(), valid);
    }
}
