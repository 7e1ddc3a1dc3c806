use opentelemetry::{InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::fmt;

/// Identity of one instrumentation scope inside a reconfigurable provider.
///
/// Two requests for equal keys always resolve to the same handle. Scope
/// attributes are deliberately left out of the key: the scope that created
/// the handle first, attributes included, is the one replayed on every swap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    name: Cow<'static, str>,
    schema_url: Option<Cow<'static, str>>,
    version: Option<Cow<'static, str>>,
}

impl ScopeKey {
    /// Creates a key with no version and no schema URL.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        ScopeKey {
            name: name.into(),
            schema_url: None,
            version: None,
        }
    }

    /// Sets the instrumentation version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the schema URL.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instrumentation version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Schema URL, if any.
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    /// Builds the API scope for this key, carrying the given attributes.
    pub fn to_scope(&self, attributes: impl IntoIterator<Item = KeyValue>) -> InstrumentationScope {
        let mut builder = InstrumentationScope::builder(self.name.clone());
        if let Some(version) = &self.version {
            builder = builder.with_version(version.clone());
        }
        if let Some(schema_url) = &self.schema_url {
            builder = builder.with_schema_url(schema_url.clone());
        }
        builder.with_attributes(attributes).build()
    }
}

impl From<&InstrumentationScope> for ScopeKey {
    fn from(scope: &InstrumentationScope) -> Self {
        ScopeKey {
            name: Cow::Owned(scope.name().to_owned()),
            schema_url: scope.schema_url().map(|s| Cow::Owned(s.to_owned())),
            version: scope.version().map(|v| Cow::Owned(v.to_owned())),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        if let Some(schema_url) = &self.schema_url {
            write!(f, " ({schema_url})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_compare_all_three_fields() {
        let plain = ScopeKey::new("io.auth");
        let versioned = ScopeKey::new("io.auth").with_version("1.0.0");
        let with_schema = ScopeKey::new("io.auth").with_schema_url("https://example.com/schema");

        let set: HashSet<_> = [
            plain.clone(),
            versioned.clone(),
            with_schema.clone(),
            ScopeKey::new("io.auth").with_version("1.0.0"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 3);
        assert_ne!(plain, versioned);
        assert_ne!(versioned, with_schema);
    }

    #[test]
    fn round_trips_through_instrumentation_scope() {
        let key = ScopeKey::new("io.build")
            .with_version("2.1")
            .with_schema_url("https://example.com/build");

        let scope = key.to_scope([KeyValue::new("team", "ci")]);
        assert_eq!(scope.name(), "io.build");
        assert_eq!(scope.version(), Some("2.1"));
        assert_eq!(scope.schema_url(), Some("https://example.com/build"));
        assert_eq!(ScopeKey::from(&scope), key);
    }

    #[test]
    fn display() {
        let key = ScopeKey::new("io.auth").with_version("1.0.0");
        assert_eq!(key.to_string(), "io.auth@1.0.0");
    }
}
