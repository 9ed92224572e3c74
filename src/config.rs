use crate::heuristics::Template;
use crate::metrics::DEFAULT_BASE_UNIT_PRICE;
use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_base_unit_price")]
    pub base_unit_price: f64,
    #[serde(default)]
    pub template: Template,
}

fn default_db_path() -> String {
    "store/invoices.db".to_string()
}

fn default_base_unit_price() -> f64 {
    DEFAULT_BASE_UNIT_PRICE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            base_unit_price: default_base_unit_price(),
            template: Template::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the file if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file — using defaults");
            Ok(Self::default())
        }
    }

    /// Change the line offset of one template keyword in place, leaving the
    /// rest of the file (comments, ordering) untouched. `None` switches the
    /// keyword to same-line extraction.
    pub fn update_offset(
        path: impl AsRef<Path>,
        keyword: &str,
        offset: Option<usize>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content.parse::<DocumentMut>()?;

        let rules = doc
            .get_mut("template")
            .and_then(|t| t.get_mut("rules"))
            .and_then(|r| r.as_array_of_tables_mut())
            .ok_or("config has no [[template.rules]] entries")?;

        let rule = rules
            .iter_mut()
            .find(|t| t.get("keyword").and_then(|k| k.as_str()) == Some(keyword))
            .ok_or_else(|| format!("no template rule for keyword '{keyword}'"))?;

        match offset {
            Some(n) => {
                rule["offset"] = value(i64::try_from(n)?);
            }
            None => {
                rule.remove("offset");
            }
        }

        fs::write(&path, doc.to_string())?;
        info!(keyword = %keyword, offset = ?offset, "Template offset updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::Field;
    use std::io::Write as _;

    const SAMPLE: &str = r#"# dashboard settings
db_path = "data/idt.db"

[[template.rules]]
keyword = "Invoice Nbr:"
field = "Invoice_Number"

[[template.rules]]
# header block sits above the values
keyword = "P.O. #"
field = "PO_Number"
offset = 6
"#;

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_with_defaults() {
        let file = write_sample();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.db_path, "data/idt.db");
        assert_eq!(cfg.base_unit_price, DEFAULT_BASE_UNIT_PRICE);
        assert_eq!(cfg.template.rules.len(), 2);
        assert_eq!(cfg.template.rules[0].offset, None);
        assert_eq!(cfg.template.rules[1].field, Field::PoNumber);
        assert_eq!(cfg.template.rules[1].offset, Some(6));
    }

    #[test]
    fn test_missing_file_uses_idt_template() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.template, Template::idt());
        assert_eq!(cfg.db_path, "store/invoices.db");
    }

    #[test]
    fn test_update_offset_preserves_comments() {
        let file = write_sample();
        Config::update_offset(file.path(), "P.O. #", Some(7)).unwrap();

        let text = fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("# header block sits above the values"));
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.template.rules[1].offset, Some(7));

        Config::update_offset(file.path(), "P.O. #", None).unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.template.rules[1].offset, None);
    }

    #[test]
    fn test_shipped_config_matches_idt_template() {
        let cfg: Config = toml::from_str(include_str!("../.config/invoice_dashboard.toml")).unwrap();
        assert_eq!(cfg.template, Template::idt());
        assert_eq!(cfg.base_unit_price, DEFAULT_BASE_UNIT_PRICE);
    }

    #[test]
    fn test_update_offset_unknown_keyword() {
        let file = write_sample();
        assert!(Config::update_offset(file.path(), "Ship Date", Some(6)).is_err());
    }
}
