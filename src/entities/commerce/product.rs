use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product. Sizes and colors are JSON arrays of strings; an empty
/// array means the product has no such variant dimension.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Json")]
    pub sizes: Json,
    #[sea_orm(column_type = "Json")]
    pub colors: Json,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

impl Model {
    pub fn size_options(&self) -> Vec<String> {
        string_list(&self.sizes)
    }

    pub fn color_options(&self) -> Vec<String> {
        string_list(&self.colors)
    }

    /// A requested variant value is acceptable when the product does not
    /// restrict that dimension or lists the value.
    pub fn offers_size(&self, size: Option<&str>) -> bool {
        offers(&self.size_options(), size)
    }

    pub fn offers_color(&self, color: Option<&str>) -> bool {
        offers(&self.color_options(), color)
    }
}

fn offers(options: &[String], requested: Option<&str>) -> bool {
    match requested {
        None => true,
        Some(value) => options.is_empty() || options.iter().any(|o| o == value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn product(sizes: Json, colors: Json) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            name: "Tee".into(),
            description: None,
            price: dec!(500),
            sizes,
            colors,
            image_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn variant_checks_respect_listed_options() {
        let p = product(json!(["S", "M"]), json!([]));
        assert!(p.offers_size(Some("M")));
        assert!(!p.offers_size(Some("XL")));
        assert!(p.offers_size(None));
        assert!(p.offers_color(Some("red")));
    }
}
