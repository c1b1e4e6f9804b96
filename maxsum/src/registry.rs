use std::collections::BTreeMap;

use crate::{MaxSumError, Result, ValIndex, VarId};

/// Table of variable domain sizes.
///
/// A variable may be registered any number of times, but its domain size can
/// never change once set. Functions cache the sizes they were built with, so a
/// registry should be fully populated before it is shared with a controller.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RegistryParts")]
pub struct VarRegistry {
    sizes: BTreeMap<VarId, ValIndex>,
}

#[derive(serde::Deserialize)]
struct RegistryParts {
    sizes: BTreeMap<VarId, ValIndex>,
}

impl TryFrom<RegistryParts> for VarRegistry {
    type Error = MaxSumError;
    fn try_from(parts: RegistryParts) -> Result<Self> {
        let mut reg = VarRegistry::new();
        reg.register_all(parts.sizes)?;
        Ok(reg)
    }
}

impl VarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, var: VarId, size: ValIndex) -> Result<()> {
        if size == 0 {
            return Err(MaxSumError::ZeroDomainSize(var));
        }
        match self.sizes.get(&var) {
            Some(&registered) if registered != size => Err(MaxSumError::DomainSizeConflict {
                var,
                registered,
                requested: size,
            }),
            Some(_) => Ok(()),
            None => {
                self.sizes.insert(var, size);
                Ok(())
            }
        }
    }

    /// Registers every `(var, size)` pair, stopping at the first failure.
    pub fn register_all(&mut self, vars: impl IntoIterator<Item = (VarId, ValIndex)>) -> Result<()> {
        for (var, size) in vars {
            self.register(var, size)?;
        }
        Ok(())
    }

    pub fn domain_size(&self, var: VarId) -> Result<ValIndex> {
        self.sizes
            .get(&var)
            .copied()
            .ok_or(MaxSumError::UnknownVariable(var))
    }

    pub fn is_registered(&self, var: VarId) -> bool {
        self.sizes.contains_key(&var)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Domain sizes of `vars`, in the same order.
    pub(crate) fn sizes_of(&self, vars: &[VarId]) -> Result<Vec<ValIndex>> {
        vars.iter().map(|v| self.domain_size(*v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_write_once() {
        let mut reg = VarRegistry::new();
        reg.register(3, 4).unwrap();
        reg.register(3, 4).unwrap();
        assert_eq!(
            reg.register(3, 5),
            Err(MaxSumError::DomainSizeConflict {
                var: 3,
                registered: 4,
                requested: 5
            })
        );
        assert_eq!(reg.domain_size(3), Ok(4));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_and_empty_domains() {
        let mut reg = VarRegistry::new();
        assert!(reg.is_empty());
        assert!(!reg.is_registered(1));
        assert_eq!(reg.domain_size(1), Err(MaxSumError::UnknownVariable(1)));
        assert_eq!(reg.register(1, 0), Err(MaxSumError::ZeroDomainSize(1)));
        reg.register_all([(1, 2), (2, 3)]).unwrap();
        assert_eq!(reg.sizes_of(&[2, 1]), Ok(vec![3, 2]));
        assert_eq!(reg.sizes_of(&[2, 7]), Err(MaxSumError::UnknownVariable(7)));
    }
}
