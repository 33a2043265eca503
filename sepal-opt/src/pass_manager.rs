//! Define the PassManager structure that is used to register and run graph
//! transformations.
use crate::transform::{apply_to_fixpoint, Named, Transform};
use itertools::Itertools;
use sepal_ir::{self as ir, Printer};
use sepal_utils::{Error, SepalResult};
use std::collections::HashMap;
use std::time::Instant;

/// Top-level type for all transformations that rewrite an [ir::Context].
/// The closure runs its transformation to fixpoint and reports how many
/// times it applied.
pub type TransformClosure = Box<dyn Fn(&mut ir::Context) -> SepalResult<u64>>;

/// Structure that tracks all registered transformations for the compiler.
/// Constructed explicitly at process start; registration is a deliberate
/// call, never an import-time side effect.
#[derive(Default)]
pub struct PassManager {
    /// All registered transformations.
    passes: HashMap<String, TransformClosure>,
    /// Help information per transformation.
    help: HashMap<String, String>,
}

impl PassManager {
    /// Register a new transformation and return an error if another one with
    /// the same name has already been registered.
    pub fn register_transform<T>(&mut self) -> SepalResult<()>
    where
        T: Transform + Named + Default + 'static,
    {
        let name = T::name().to_string();
        if self.passes.contains_key(&name) {
            return Err(Error::misc(format!(
                "Transformation with name '{}' is already registered.",
                name
            )));
        }
        self.passes
            .insert(name.clone(), Box::new(|ctx| apply_to_fixpoint::<T>(ctx)));
        self.help
            .insert(name.clone(), format!("- {}: {}", name, T::description()));
        Ok(())
    }

    /// A registry with the in-tree transformations registered.
    pub fn default_registry() -> SepalResult<Self> {
        let mut pm = PassManager::default();
        pm.register_transform::<crate::passes::OffloadStateToAccel>()?;
        Ok(pm)
    }

    /// Return a string representation to show all available transformations.
    /// Appropriate for help text.
    pub fn complete_help(&self) -> String {
        let mut ret = String::from("Transformations:\n");
        for name in self.passes.keys().sorted() {
            ret.push_str(&self.help[name]);
            ret.push('\n');
        }
        ret
    }

    /// Execute the named transformations in order, each to fixpoint.
    /// Candidate enumeration restarts after every application, so handles
    /// never outlive the mutation that invalidates them.
    pub fn execute_plan(
        &self,
        ctx: &mut ir::Context,
        plan: &[String],
        dump_ir: bool,
    ) -> SepalResult<()> {
        for name in plan {
            let pass = self.passes.get(name).ok_or_else(|| {
                Error::misc(format!(
                    "Unknown transformation: {name}. See complete_help() for registered names."
                ))
            })?;

            let start = Instant::now();
            let applied = pass(ctx)?;
            if dump_ir {
                Printer::write_context(ctx, &mut std::io::stdout())
                    .map_err(|err| Error::misc(err.to_string()))?;
            }
            log::info!(
                "{name}: applied {applied} time(s) in {}ms",
                start.elapsed().as_millis()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::OffloadStateToAccel;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut pm = PassManager::default();
        pm.register_transform::<OffloadStateToAccel>().unwrap();
        assert!(pm.register_transform::<OffloadStateToAccel>().is_err());
    }

    #[test]
    fn help_lists_registered_transforms() {
        let pm = PassManager::default_registry().unwrap();
        let help = pm.complete_help();
        assert!(help.contains(OffloadStateToAccel::name()));
    }

    #[test]
    fn unknown_transform_in_plan_errors() {
        let pm = PassManager::default_registry().unwrap();
        let mut ctx = ir::Context::new(ir::Graph::new("prog"));
        let err = pm.execute_plan(&mut ctx, &["no-such-pass".to_string()], false);
        assert!(err.is_err());
    }
}
