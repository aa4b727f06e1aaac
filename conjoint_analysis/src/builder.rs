pub use crate::config::*;
use crate::validate_attributes;

/// A builder for assembling the attributes of a study.
///
/// It enforces the structural invariants before any design is generated:
/// at least two distinct levels per attribute, unique attribute names, and
/// at most one price attribute.
///
/// ```
/// use conjoint_analysis::builder::StudyBuilder;
/// # use conjoint_analysis::ConjointError;
///
/// let attributes = StudyBuilder::new()
///     .attribute("Storage", &["10GB", "100GB", "1TB"])
///     .price_attribute("Price", &["$5", "$10", "$20"], "USD")
///     .toggle_attribute("Priority support")
///     .build()?;
///
/// assert_eq!(attributes.len(), 3);
/// # Ok::<(), ConjointError>(())
/// ```
pub struct StudyBuilder {
    _attributes: Vec<Attribute>,
}

impl StudyBuilder {
    pub fn new() -> StudyBuilder {
        StudyBuilder {
            _attributes: Vec::new(),
        }
    }

    /// Adds a standard attribute with free-form levels.
    pub fn attribute(mut self, name: &str, levels: &[&str]) -> StudyBuilder {
        self._attributes.push(Attribute::standard(name, levels));
        self
    }

    /// Adds the study's price attribute. At most one may exist.
    pub fn price_attribute(mut self, name: &str, levels: &[&str], currency: &str) -> StudyBuilder {
        let mut attr = Attribute::standard(name, levels);
        attr.is_price_attribute = true;
        attr.currency = Some(currency.to_string());
        self._attributes.push(attr);
        self
    }

    /// Adds a binary included/not-included toggle. Its levels are fixed and
    /// not independently editable.
    pub fn toggle_attribute(mut self, name: &str) -> StudyBuilder {
        self._attributes.push(Attribute {
            name: name.to_string(),
            description: None,
            kind: AttributeKind::IncludedNotIncluded,
            levels: AttributeKind::INCLUDED_LEVELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            is_price_attribute: false,
            currency: None,
        });
        self
    }

    pub fn description(mut self, text: &str) -> StudyBuilder {
        if let Some(last) = self._attributes.last_mut() {
            last.description = Some(text.to_string());
        }
        self
    }

    /// Validates the collected attributes and returns them.
    pub fn build(self) -> Result<Vec<Attribute>, ConjointError> {
        validate_attributes(&self._attributes)?;
        Ok(self._attributes)
    }
}

impl Default for StudyBuilder {
    fn default() -> Self {
        StudyBuilder::new()
    }
}
