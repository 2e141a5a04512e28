//! Legacy field names.
//!
//! Applied once per plugin before validation. Each alias found is renamed to
//! its canonical field in place, unless the canonical field is present too,
//! in which case the alias is dropped. Both cases log a warning.

use super::{
    Plugin, APP_FIELD, LISTENERS_FIELD, MIDDLEWARE_FIELD, MODEL_FIELD, STRATEGY_FIELD,
};
use tracing::warn;

/// `(legacy, canonical)` field names.
pub const ALIASES: &[(&str, &str)] = &[
    ("models", MODEL_FIELD),
    ("middlewares", MIDDLEWARE_FIELD),
    ("events", LISTENERS_FIELD),
    ("strategies", STRATEGY_FIELD),
    ("settings", APP_FIELD),
];

/// One applied alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatNotice {
    pub alias: &'static str,
    pub canonical: &'static str,
    /// The canonical field was present, so the alias was ignored.
    pub dropped: bool,
}

/// Rewrite legacy field names of `plugin`.
pub fn migrate(plugin: &mut Plugin) -> Vec<CompatNotice> {
    let name = plugin.name().to_string();
    let fields = plugin.fields_mut();
    let mut notices = Vec::new();

    for &(alias, canonical) in ALIASES {
        let Some(index) = fields.get_index_of(alias) else {
            continue;
        };
        let dropped = fields.contains_key(canonical);
        if let Some(value) = fields.shift_remove(alias) {
            if dropped {
                warn!(plugin = %name, alias, canonical, "Deprecated plugin field ignored, canonical field present");
            } else {
                warn!(plugin = %name, alias, canonical, "Deprecated plugin field renamed");
                fields.shift_insert(index, canonical.to_string(), value);
            }
        }
        notices.push(CompatNotice {
            alias,
            canonical,
            dropped,
        });
    }
    notices
}
