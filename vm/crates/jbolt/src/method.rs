//! Method identity shared by the code cache, rankings and order files.

use std::fmt;

/// Holder class, method name and signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub holder: String,
    pub name: String,
    pub signature: String,
}

impl MethodKey {
    pub fn new(
        holder: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.holder, self.name, self.signature)
    }
}
