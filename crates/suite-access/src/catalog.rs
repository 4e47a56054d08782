//! Immutable module catalog
//!
//! The catalog is the registry of every addressable module path in the
//! deployment. It is built once at process start and treated as read-only
//! thereafter; resolvers share it behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::path::ModulePath;

/// Action codes available on a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDef {
    /// Component code, e.g. `list`
    pub code: String,
    /// Action codes, e.g. `view`, `create`
    pub actions: Vec<String>,
}

/// Components grouped under a sub-module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubModuleDef {
    /// Sub-module code, e.g. `employees`
    pub code: String,
    /// Components of this sub-module
    pub components: Vec<ComponentDef>,
}

/// A top-level module definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    /// Module code, e.g. `hrm`
    pub code: String,
    /// Display name, e.g. `Human Resources`
    pub name: String,
    /// Sub-modules of this module
    pub submodules: Vec<SubModuleDef>,
}

/// Registry of addressable module paths
///
/// Deeper entries always have their prefixes registered too, so the prefix
/// invariant on [`ModulePath`] holds for every catalog hit by construction.
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    paths: HashSet<String>,
    module_names: BTreeMap<String, String>,
}

impl ModuleCatalog {
    /// Build a catalog from module definitions.
    pub fn from_modules(modules: Vec<ModuleDef>) -> Self {
        let mut paths = HashSet::new();
        let mut module_names = BTreeMap::new();

        for module in modules {
            module_names.insert(module.code.clone(), module.name);
            paths.insert(module.code.clone());
            for sub in module.submodules {
                let sub_key = format!("{}.{}", module.code, sub.code);
                paths.insert(sub_key.clone());
                for component in sub.components {
                    let comp_key = format!("{sub_key}.{}", component.code);
                    paths.insert(comp_key.clone());
                    for action in component.actions {
                        paths.insert(format!("{comp_key}.{action}"));
                    }
                }
            }
        }

        Self {
            paths,
            module_names,
        }
    }

    /// True when the path is registered at exactly its supplied depth.
    pub fn contains(&self, path: &ModulePath) -> bool {
        self.paths.contains(&path.permission_key())
    }

    /// Display name of a top-level module, if registered.
    pub fn module_name(&self, code: &str) -> Option<&str> {
        self.module_names.get(code).map(String::as_str)
    }

    /// Registered top-level module codes.
    pub fn module_codes(&self) -> Vec<&str> {
        self.module_names.keys().map(String::as_str).collect()
    }

    /// Number of registered paths across all depths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no paths are registered.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The default ERP catalog shipped with the suite.
    pub fn standard() -> Self {
        fn component(code: &str, actions: &[&str]) -> ComponentDef {
            ComponentDef {
                code: code.into(),
                actions: actions.iter().map(|a| (*a).into()).collect(),
            }
        }
        fn submodule(code: &str, components: Vec<ComponentDef>) -> SubModuleDef {
            SubModuleDef {
                code: code.into(),
                components,
            }
        }

        let crud = &["view", "create", "edit", "delete"];

        Self::from_modules(vec![
            ModuleDef {
                code: "hrm".into(),
                name: "Human Resources".into(),
                submodules: vec![
                    submodule(
                        "employees",
                        vec![component("list", crud), component("profile", &["view", "edit"])],
                    ),
                    submodule(
                        "payroll",
                        vec![component("runs", &["view", "create", "approve"])],
                    ),
                    submodule(
                        "leave",
                        vec![component("requests", &["view", "create", "approve", "reject"])],
                    ),
                ],
            },
            ModuleDef {
                code: "crm".into(),
                name: "Customer Relations".into(),
                submodules: vec![
                    submodule("leads", vec![component("pipeline", crud)]),
                    submodule("contacts", vec![component("directory", crud)]),
                ],
            },
            ModuleDef {
                code: "inventory".into(),
                name: "Inventory".into(),
                submodules: vec![
                    submodule("items", vec![component("stock", crud)]),
                    submodule(
                        "warehouses",
                        vec![component("locations", &["view", "create", "edit"])],
                    ),
                ],
            },
            ModuleDef {
                code: "accounting".into(),
                name: "Accounting".into(),
                submodules: vec![
                    submodule(
                        "invoices",
                        vec![component("ledger", &["view", "create", "void"])],
                    ),
                    submodule("reports", vec![component("statements", &["view", "export"])]),
                ],
            },
            ModuleDef {
                code: "settings".into(),
                name: "Settings".into(),
                submodules: vec![
                    submodule("users", vec![component("accounts", crud)]),
                    submodule("roles", vec![component("assignments", &["view", "edit"])]),
                ],
            },
        ])
    }
}
