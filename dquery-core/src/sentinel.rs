//! Named "not set" markers.
//!
//! A sentinel is distinct from every real value, `Value::Null` included.
//! Two sentinels are equal only when they carry the same name.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sentinel {
    name: &'static str,
}

impl Sentinel {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

/// Marks a `DataTable` cell that has no value for its row.
pub const NOT_SET: Sentinel = Sentinel::new("NOT_SET");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_identity_by_name() {
        const OTHER: Sentinel = Sentinel::new("OTHER");
        assert_eq!(NOT_SET, Sentinel::new("NOT_SET"));
        assert_ne!(NOT_SET, OTHER);
        assert_eq!(NOT_SET.to_string(), "<NOT_SET>");
        assert_eq!(format!("{:?}", OTHER), "<OTHER>");
    }
}
