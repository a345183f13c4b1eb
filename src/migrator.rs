use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_material_tables::Migration),
            Box::new(m20240301_000002_create_formula_tables::Migration),
            Box::new(m20240301_000003_create_product_tables::Migration),
        ]
    }
}

/// Money and quantity columns share the same precision.
fn amount(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

fn id(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn timestamp(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

mod m20240301_000001_create_material_tables {
    use super::{amount, id, timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_material_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UnitsOfMeasure::Table)
                        .if_not_exists()
                        .col(id(UnitsOfMeasure::Id))
                        .col(
                            ColumnDef::new(UnitsOfMeasure::Code)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(UnitsOfMeasure::Name).string_len(255).not_null())
                        .col(timestamp(UnitsOfMeasure::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RawMaterials::Table)
                        .if_not_exists()
                        .col(id(RawMaterials::Id))
                        .col(
                            ColumnDef::new(RawMaterials::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(RawMaterials::Name).string_len(255).not_null())
                        .col(amount(RawMaterials::UnitCost))
                        .col(ColumnDef::new(RawMaterials::UnitOfMeasureId).integer().null())
                        .col(
                            ColumnDef::new(RawMaterials::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp(RawMaterials::CreatedAt))
                        .col(timestamp(RawMaterials::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LabelingMaterials::Table)
                        .if_not_exists()
                        .col(id(LabelingMaterials::Id))
                        .col(
                            ColumnDef::new(LabelingMaterials::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(LabelingMaterials::Name)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(amount(LabelingMaterials::UnitCost))
                        .col(
                            ColumnDef::new(LabelingMaterials::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp(LabelingMaterials::CreatedAt))
                        .col(timestamp(LabelingMaterials::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_raw_materials_active")
                        .table(RawMaterials::Table)
                        .col(RawMaterials::Active)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LabelingMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RawMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(UnitsOfMeasure::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UnitsOfMeasure {
        Table,
        Id,
        Code,
        Name,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum RawMaterials {
        Table,
        Id,
        Code,
        Name,
        UnitCost,
        UnitOfMeasureId,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LabelingMaterials {
        Table,
        Id,
        Code,
        Name,
        UnitCost,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_formula_tables {
    use super::{amount, id, timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_formula_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Formulas::Table)
                        .if_not_exists()
                        .col(id(Formulas::Id))
                        .col(
                            ColumnDef::new(Formulas::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Formulas::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Formulas::UnitOfMeasureId).integer().null())
                        .col(amount(Formulas::TotalCost))
                        .col(
                            ColumnDef::new(Formulas::CostStale)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Formulas::CostUpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Formulas::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp(Formulas::CreatedAt))
                        .col(timestamp(Formulas::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            // Component references carry no foreign key: a deleted material leaves
            // its lines behind and the rollup's dangling-reference policy handles them.
            manager
                .create_table(
                    Table::create()
                        .table(FormulaRawMaterials::Table)
                        .if_not_exists()
                        .col(id(FormulaRawMaterials::Id))
                        .col(
                            ColumnDef::new(FormulaRawMaterials::FormulaId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FormulaRawMaterials::RawMaterialId)
                                .integer()
                                .not_null(),
                        )
                        .col(amount(FormulaRawMaterials::Quantity))
                        .col(amount(FormulaRawMaterials::PartialCost))
                        .col(timestamp(FormulaRawMaterials::CreatedAt))
                        .col(timestamp(FormulaRawMaterials::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_formula_raw_materials_formula_id")
                                .from(FormulaRawMaterials::Table, FormulaRawMaterials::FormulaId)
                                .to(Formulas::Table, Formulas::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FormulaNestedFormulas::Table)
                        .if_not_exists()
                        .col(id(FormulaNestedFormulas::Id))
                        .col(
                            ColumnDef::new(FormulaNestedFormulas::ParentFormulaId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FormulaNestedFormulas::ChildFormulaId)
                                .integer()
                                .not_null(),
                        )
                        .col(amount(FormulaNestedFormulas::Quantity))
                        .col(amount(FormulaNestedFormulas::PartialCost))
                        .col(timestamp(FormulaNestedFormulas::CreatedAt))
                        .col(timestamp(FormulaNestedFormulas::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_formula_nested_formulas_parent_id")
                                .from(
                                    FormulaNestedFormulas::Table,
                                    FormulaNestedFormulas::ParentFormulaId,
                                )
                                .to(Formulas::Table, Formulas::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_formula_raw_materials_formula_id")
                        .table(FormulaRawMaterials::Table)
                        .col(FormulaRawMaterials::FormulaId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_formula_raw_materials_raw_material_id")
                        .table(FormulaRawMaterials::Table)
                        .col(FormulaRawMaterials::RawMaterialId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_formula_nested_formulas_child_id")
                        .table(FormulaNestedFormulas::Table)
                        .col(FormulaNestedFormulas::ChildFormulaId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FormulaNestedFormulas::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(FormulaRawMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Formulas::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Formulas {
        Table,
        Id,
        Code,
        Name,
        UnitOfMeasureId,
        TotalCost,
        CostStale,
        CostUpdatedAt,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum FormulaRawMaterials {
        Table,
        Id,
        FormulaId,
        RawMaterialId,
        Quantity,
        PartialCost,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum FormulaNestedFormulas {
        Table,
        Id,
        ParentFormulaId,
        ChildFormulaId,
        Quantity,
        PartialCost,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_product_tables {
    use super::{amount, id, timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_product_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(id(Products::Id))
                        .col(ColumnDef::new(Products::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Products::ClientId).integer().null())
                        .col(ColumnDef::new(Products::ZoneId).integer().null())
                        .col(amount(Products::Mp))
                        .col(amount(Products::Me))
                        .col(amount(Products::Ms))
                        .col(amount(Products::MpPercentage))
                        .col(amount(Products::MePercentage))
                        .col(amount(Products::MsPercentage))
                        .col(amount(Products::Cost))
                        .col(
                            ColumnDef::new(Products::CostStale)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Products::CostUpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(timestamp(Products::CreatedAt))
                        .col(timestamp(Products::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            for (table, component, fk_name, idx_name) in [
                (
                    ProductLines::ProductFormulas,
                    ProductLines::FormulaId,
                    "fk_product_formulas_product_id",
                    "idx_product_formulas_formula_id",
                ),
                (
                    ProductLines::ProductRawMaterials,
                    ProductLines::RawMaterialId,
                    "fk_product_raw_materials_product_id",
                    "idx_product_raw_materials_raw_material_id",
                ),
                (
                    ProductLines::ProductLabelingMaterials,
                    ProductLines::LabelingMaterialId,
                    "fk_product_labeling_materials_product_id",
                    "idx_product_labeling_materials_labeling_material_id",
                ),
            ] {
                manager
                    .create_table(
                        Table::create()
                            .table(table)
                            .if_not_exists()
                            .col(id(ProductLines::Id))
                            .col(ColumnDef::new(ProductLines::ProductId).integer().not_null())
                            .col(ColumnDef::new(component).integer().not_null())
                            .col(amount(ProductLines::Quantity))
                            .col(amount(ProductLines::PartialCost))
                            .col(timestamp(ProductLines::CreatedAt))
                            .col(timestamp(ProductLines::UpdatedAt))
                            .foreign_key(
                                ForeignKey::create()
                                    .name(fk_name)
                                    .from(table, ProductLines::ProductId)
                                    .to(Products::Table, Products::Id)
                                    .on_delete(ForeignKeyAction::Cascade),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .name(idx_name)
                            .table(table)
                            .col(component)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                ProductLines::ProductLabelingMaterials,
                ProductLines::ProductRawMaterials,
                ProductLines::ProductFormulas,
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        ClientId,
        ZoneId,
        Mp,
        Me,
        Ms,
        MpPercentage,
        MePercentage,
        MsPercentage,
        Cost,
        CostStale,
        CostUpdatedAt,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    /// Identifiers shared by the three product composition tables.
    #[derive(DeriveIden, Clone, Copy)]
    enum ProductLines {
        ProductFormulas,
        ProductRawMaterials,
        ProductLabelingMaterials,
        Id,
        ProductId,
        FormulaId,
        RawMaterialId,
        LabelingMaterialId,
        Quantity,
        PartialCost,
        CreatedAt,
        UpdatedAt,
    }
}
