//! IR module definition

use super::instruction::Statement;

/// Deployed (runtime) object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedObject {
    /// Object name (`<Class>_deployed`)
    pub name: String,
    /// Runtime code: dispatcher followed by function definitions
    pub code: Vec<Statement>,
}

/// Complete IR module for one compiled class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrModule {
    /// Object name (the class name)
    pub name: String,
    /// Constructor region: initializers, constructor chain, code copy and return
    pub constructor_code: Vec<Statement>,
    /// Deployed region
    pub deployed: DeployedObject,
    /// Classes whose creation code must be linked in as sub-objects (`new C()`)
    pub dependencies: Vec<String>,
}

impl IrModule {
    /// Create an empty module
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constructor_code: Vec::new(),
            deployed: DeployedObject {
                name: deployed_name(name),
                code: Vec::new(),
            },
            dependencies: Vec::new(),
        }
    }

    /// Names of all functions defined at the top level of the deployed region
    pub fn deployed_functions(&self) -> Vec<&str> {
        self.deployed
            .code
            .iter()
            .filter_map(|s| match s {
                Statement::FunctionDef(f) => Some(f.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of top-level statements in both regions
    pub fn statement_count(&self) -> usize {
        self.constructor_code.len() + self.deployed.code.len()
    }
}

/// Name of the deployed object for a class
pub fn deployed_name(class: &str) -> String {
    format!("{}_deployed", class)
}
