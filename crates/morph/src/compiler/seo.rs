//! Reserved SEO fields appended to every entity type.

use morph_api::{ApiError, Result};

use super::field::{FieldKind, ScalarType, StorageField};

pub const SEO_FIELDS: [&str; 7] = [
    "seoTitle",
    "seoDescription",
    "focusKeywords",
    "canonicalUrl",
    "metaRobots",
    "openGraphTitle",
    "openGraphDescription",
];

pub fn is_seo_field(name: &str) -> bool {
    SEO_FIELDS.contains(&name)
}

/// Mark declared SEO fields and append the missing ones, in reserved order.
///
/// A declared SEO field must compile to plain text.
pub fn augment(fields: &mut Vec<StorageField>) -> Result<()> {
    for field in fields.iter_mut().filter(|f| is_seo_field(&f.name)) {
        if field.kind
            != (FieldKind::Scalar {
                scalar: ScalarType::Text,
            })
        {
            return Err(ApiError::invalid_descriptor(format!(
                "reserved SEO field '{}' must be a plain string",
                field.name
            )));
        }
        field.seo = true;
    }

    for name in SEO_FIELDS {
        if !fields.iter().any(|f| f.name == name) {
            fields.push(StorageField {
                name: name.to_string(),
                kind: FieldKind::Scalar {
                    scalar: ScalarType::Text,
                },
                required: false,
                ui_hint: "text".to_string(),
                seo: true,
            });
        }
    }
    Ok(())
}
