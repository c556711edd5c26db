use std::collections::HashSet;

use crate::error::ValidationError;

/// Names of params already recorded for the run.
#[derive(Debug, Default)]
pub(crate) struct ParamRegistry {
    names: HashSet<String>,
}

impl ParamRegistry {
    /// Registers `name`; a second registration is a caller error.
    pub(crate) fn register(&mut self, name: &str) -> Result<(), ValidationError> {
        if self.names.contains(name) {
            return Err(ValidationError::DuplicateParam {
                name: name.to_string(),
            });
        }
        self.names.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_second_registration() {
        let mut reg = ParamRegistry::default();
        reg.register("lr").unwrap();
        reg.register("batch").unwrap();
        assert_eq!(
            reg.register("lr"),
            Err(ValidationError::DuplicateParam { name: "lr".into() })
        );
    }
}
