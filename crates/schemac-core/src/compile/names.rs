//! Fixed names used by every compiled schema function

use crate::codegen::Name;
use crate::runtime::FnParams;

/// Parameter names of a schema function
#[derive(Debug, Clone)]
pub struct Names {
    pub data: Name,
    pub instance_path: Name,
    pub root_data: Name,
}

impl Default for Names {
    fn default() -> Self {
        Self {
            data: Name::new("data"),
            instance_path: Name::new("instancePath"),
            root_data: Name::new("rootData"),
        }
    }
}

impl Names {
    pub fn params(&self) -> FnParams {
        FnParams {
            data: self.data.clone(),
            instance_path: self.instance_path.clone(),
            root_data: self.root_data.clone(),
        }
    }
}

/// Value scope prefixes
pub mod prefix {
    pub const VALIDATE: &str = "validate";
    pub const PATTERN: &str = "pattern";
    pub const FORMAT: &str = "formats";
    pub const KEYWORD: &str = "keyword";
    pub const SCHEMA: &str = "schema";
}
