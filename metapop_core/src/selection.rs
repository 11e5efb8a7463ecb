//! Single-name or multi-name lookups for compartment and attribute getters.

use metapop_env::Result;

/// A name, or a list of names whose values are summed.
///
/// Lets `get_compartment_value(p, "S")` and
/// `get_compartment_value(p, &["S", "I"])` share one getter.
pub trait NameSelection {
    /// Visits every selected name in order, stopping at the first error.
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()>;
}

impl NameSelection for str {
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        f(self)
    }
}

impl NameSelection for String {
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        f(self)
    }
}

impl<T: AsRef<str>> NameSelection for [T] {
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        for name in self {
            f(name.as_ref())?;
        }
        Ok(())
    }
}

impl<T: AsRef<str>> NameSelection for Vec<T> {
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        self.as_slice().try_for_each_name(f)
    }
}

impl<T: AsRef<str>, const N: usize> NameSelection for [T; N] {
    fn try_for_each_name(&self, f: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        self.as_slice().try_for_each_name(f)
    }
}
