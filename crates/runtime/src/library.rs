//! Declarative library binding.
//!
//! Instead of scanning a host type at runtime, callers build the capability
//! table ahead of time: a `Library` is a version-marked mapping from entry
//! names to callbacks, constructed once per host type and bound into the
//! global namespace as a single table. Eligibility is enforced by the
//! callback signature type, so an entry that cannot be adapted simply does
//! not construct.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::Interp;
use crate::value::Callback;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("version pattern compiles"));

/// Semantic version triple carried by a library marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
}

impl Version {
    /// Parses a `major.minor.patch` string. Anything else is a
    /// configuration error, raised before any table is created.
    pub fn parse(text: &str) -> Result<Self> {
        let captures = VERSION_PATTERN.captures(text).ok_or_else(|| {
            Error::Configuration(format!(
                "library version '{text}' does not match major.minor.patch"
            ))
        })?;
        let field = |i: usize| {
            captures[i].parse::<u32>().map_err(|_| {
                Error::Configuration(format!("library version '{text}' has an oversized segment"))
            })
        };
        Ok(Self {
            major: field(1)?,
            minor: field(2)?,
            patch: field(3)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The declarative marker attached to a host library: its version, plus an
/// optional display name that overrides the class name as the binding's
/// table key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDescriptor {
    version: Version,
    display_name: Option<String>,
}

impl LibraryDescriptor {
    pub fn new(version: &str) -> Result<Self> {
        Ok(Self {
            version: Version::parse(version)?,
            display_name: None,
        })
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// One host type's capability table: the class name, its marker, and the
/// script-callable entries.
pub struct Library {
    class_name: String,
    descriptor: LibraryDescriptor,
    methods: Vec<(String, Callback)>,
}

impl Library {
    pub fn new(class_name: impl Into<String>, descriptor: LibraryDescriptor) -> Self {
        Self {
            class_name: class_name.into(),
            descriptor,
            methods: Vec::new(),
        }
    }

    /// Adds a script-callable entry.
    pub fn method(mut self, name: impl Into<String>, callback: Callback) -> Self {
        self.methods.push((name.into(), callback));
        self
    }

    /// True class name of the host type; always recorded as `__classname`.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Key the library binds under: the display name when the marker has
    /// one, the class name otherwise.
    pub fn table_name(&self) -> &str {
        self.descriptor
            .display_name()
            .unwrap_or(&self.class_name)
    }

    pub fn descriptor(&self) -> &LibraryDescriptor {
        &self.descriptor
    }

    pub fn methods(&self) -> &[(String, Callback)] {
        &self.methods
    }
}

impl Interp {
    /// Binds `library` into the global namespace: creates one table, stores
    /// the `__version` and `__classname` metadata entries and every method
    /// under its own name, then binds the table under
    /// [`Library::table_name`].
    ///
    /// A library with zero methods binds nothing: no table is created and
    /// no error is raised. That mirrors the long-standing loader behavior;
    /// whether it is intentional has never been established, so it is
    /// preserved rather than corrected.
    pub fn load_library(&self, library: &Library) -> Result<()> {
        if library.methods.is_empty() {
            debug!(
                library = library.table_name(),
                "library has no eligible methods, nothing bound"
            );
            return Ok(());
        }
        if library.methods.iter().any(|(name, _)| name.is_empty()) {
            return Err(Error::Configuration(format!(
                "library '{}' has an entry with an empty name",
                library.class_name
            )));
        }

        let stack = self.stack();
        let tables = self.tables();
        let base = stack.top_index()?;

        let result = (|| -> Result<()> {
            // Push the chosen name first; it becomes the key when the
            // finished table is bound below.
            stack.push(library.table_name())?;
            let table = tables.add()?;
            table.set_value("__version", library.descriptor.version.to_string())?;
            table.set_value("__classname", library.class_name.as_str())?;
            for (name, callback) in &library.methods {
                table.set_value(name.as_str(), *callback)?;
            }
            // Stack now holds [name, table]; bind global[name] = table.
            tables.global().set_table()
        })();

        if result.is_err() {
            // Leave no partially-built slots behind.
            let _ = stack.set_top(base);
        } else {
            debug!(
                library = library.table_name(),
                version = %library.descriptor.version,
                methods = library.methods.len(),
                "library bound into global namespace"
            );
        }
        result
    }

    /// Binds a whole set of libraries, stopping at the first failure.
    pub fn load_libraries(&self, libraries: &[Library]) -> Result<()> {
        for library in libraries {
            self.load_library(library)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parses_triple() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn test_version_rejects_missing_patch_segment() {
        // Raised at construction, before any table exists.
        assert!(matches!(
            Version::parse("1.0"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_version_rejects_decorations() {
        assert!(Version::parse("v1.0.0").is_err());
        assert!(Version::parse("1.0.0-beta").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_descriptor_display_name_overrides_class_name() {
        let lib = Library::new(
            "Screen",
            LibraryDescriptor::new("1.0.0").unwrap().named("term"),
        );
        assert_eq!(lib.table_name(), "term");
        assert_eq!(lib.class_name(), "Screen");
    }
}
