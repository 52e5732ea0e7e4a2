//! Recipe parsing and graph validation.
//!
//! A recipe is a YAML mapping of target name to build steps. Order in the
//! file is preserved; the scheduler sweeps targets in that order.

use serde::Deserialize;
use serde_yaml::Mapping;

use crate::error::{Error, Result, ValidationError};
use crate::oci::TagStore;

/// Reserved base name for targets built from a blank rootfs.
pub const EMPTY_BASE: &str = "empty";

/// One buildable target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub base: String,
    pub expand: Vec<String>,
    pub run: Vec<String>,
    pub install: Vec<String>,
    pub entrypoint: Option<String>,
}

impl Target {
    /// Whether this target changes anything at all.
    pub fn has_work(&self) -> bool {
        !self.expand.is_empty()
            || !self.run.is_empty()
            || !self.install.is_empty()
            || self.entrypoint.is_some()
    }
}

/// Raw YAML shape of one target body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    #[serde(default)]
    base: String,
    #[serde(default)]
    expand: Option<OneOrMany>,
    #[serde(default)]
    run: Option<OneOrMany>,
    #[serde(default)]
    install: Option<OneOrMany>,
    #[serde(default, alias = "cmd")]
    entrypoint: Option<String>,
}

/// Accept `run: foo` and `run: [foo, bar]` alike.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

fn step_list(raw: Option<OneOrMany>) -> Vec<String> {
    raw.map(OneOrMany::into_vec).unwrap_or_default()
}

/// A parsed recipe file: targets in file order.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    targets: Vec<Target>,
}

impl Recipe {
    /// Parse recipe text. An empty document is a recipe with no targets.
    pub fn parse(text: &str) -> Result<Recipe> {
        let doc = match serde_yaml::from_str::<Option<Mapping>>(text)? {
            Some(mapping) => mapping,
            None => Mapping::new(),
        };

        let mut targets = Vec::with_capacity(doc.len());
        for (key, value) in doc {
            let name = key
                .as_str()
                .ok_or_else(|| Error::RecipeParse("target names must be strings".to_string()))?
                .to_string();
            let raw: RawTarget = serde_yaml::from_value(value)
                .map_err(|e| Error::RecipeParse(format!("target '{}': {}", name, e)))?;
            targets.push(Target {
                name,
                base: raw.base,
                expand: step_list(raw.expand),
                run: step_list(raw.run),
                install: step_list(raw.install),
                entrypoint: raw.entrypoint,
            });
        }

        Ok(Recipe { targets })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.iter().any(|t| t.name == name)
    }

    /// Check every target before any build starts. First problem wins,
    /// in file order: a target must name a base, the base must be `empty`,
    /// a sibling target, or an existing tag, and the target must do some
    /// work.
    pub fn validate(&self, store: &dyn TagStore) -> std::result::Result<(), ValidationError> {
        for target in &self.targets {
            if target.base.is_empty() {
                return Err(ValidationError::MissingBase(target.name.clone()));
            }
            if target.base != EMPTY_BASE
                && !self.has_target(&target.base)
                && !store.tag_exists(&target.base)
            {
                return Err(ValidationError::UnknownBase {
                    target: target.name.clone(),
                    base: target.base.clone(),
                });
            }
            if !target.has_work() {
                return Err(ValidationError::EmptyTarget(target.name.clone()));
            }
        }
        Ok(())
    }
}
