//! Hierarchical module addresses

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AccessError;

/// Depth at which a path is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathDepth {
    /// Top-level module, e.g. `hrm`
    Module,
    /// Sub-module, e.g. `hrm.employees`
    SubModule,
    /// Component, e.g. `hrm.employees.list`
    Component,
    /// Action, e.g. `hrm.employees.list.view`
    Action,
}

/// A 1-to-4 level module address: `module[.submodule[.component[.action]]]`
///
/// Empty-string segments are treated as absent. A segment may only be present
/// when every shallower segment is present, so a valid path is always a
/// contiguous prefix of the four levels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModulePath {
    module: String,
    submodule: Option<String>,
    component: Option<String>,
    action: Option<String>,
}

fn normalize(segment: Option<&str>) -> Option<String> {
    segment
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl ModulePath {
    /// Build a path from explicit segments.
    ///
    /// Empty or whitespace-only segments are normalized to absent. An empty
    /// module, or a deeper segment supplied without its parent, is malformed
    /// input and returns an error rather than a decision.
    pub fn new(
        module: &str,
        submodule: Option<&str>,
        component: Option<&str>,
        action: Option<&str>,
    ) -> Result<Self, AccessError> {
        let module = normalize(Some(module)).ok_or(AccessError::EmptyPath)?;
        let submodule = normalize(submodule);
        let component = normalize(component);
        let action = normalize(action);

        let contiguous = match (&submodule, &component, &action) {
            (None, Some(_), _) | (None, _, Some(_)) | (_, None, Some(_)) => false,
            _ => true,
        };
        let path = Self {
            module,
            submodule,
            component,
            action,
        };
        if !contiguous {
            return Err(AccessError::DiscontinuousPath(path.to_string()));
        }
        Ok(path)
    }

    /// Parse a dotted path such as `hrm.employees.list.view`.
    pub fn parse(raw: &str) -> Result<Self, AccessError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() > 4 {
            return Err(AccessError::TooDeep(raw.to_string()));
        }
        let get = |i: usize| segments.get(i).copied();
        Self::new(
            get(0).unwrap_or(""),
            get(1),
            get(2),
            get(3),
        )
    }

    /// Top-level module code.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Depth of the deepest supplied segment. Evaluation always happens at
    /// this level only; shallower levels are never implied.
    pub fn depth(&self) -> PathDepth {
        if self.action.is_some() {
            PathDepth::Action
        } else if self.component.is_some() {
            PathDepth::Component
        } else if self.submodule.is_some() {
            PathDepth::SubModule
        } else {
            PathDepth::Module
        }
    }

    /// The dotted capability key this path requires, e.g.
    /// `hrm.employees.list.view`.
    pub fn permission_key(&self) -> String {
        self.to_string()
    }

    /// All dotted prefixes of this path, shallowest first.
    pub fn prefixes(&self) -> Vec<String> {
        let mut out = vec![self.module.clone()];
        let mut current = self.module.clone();
        for segment in [&self.submodule, &self.component, &self.action]
            .into_iter()
            .flatten()
        {
            current = format!("{current}.{segment}");
            out.push(current.clone());
        }
        out
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        for segment in [&self.submodule, &self.component, &self.action]
            .into_iter()
            .flatten()
        {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}
