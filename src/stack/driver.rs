//! Generic lifecycle controller for one stack.

use std::marker::PhantomData;

use tracing::{debug, info, instrument};

use crate::program::ProgramContext;

use super::{Engine, OutputMap, StackContract, StackError, StackIdentity, output_map};

/// Owns one stack identity and mediates every engine call made for it.
///
/// The driver holds no infrastructure state of its own: the resource graph
/// lives in the engine's persisted stack, addressed by the identity.
/// Callers serialise operations against one stack; the engine reports a
/// concurrent update as an [`StackError::Engine`] conflict.
#[derive(Debug)]
pub struct StackDriver<E, C>
where
    E: Engine,
    C: StackContract,
{
    engine: E,
    identity: StackIdentity,
    contract: PhantomData<fn() -> C>,
}

impl<E, C> StackDriver<E, C>
where
    E: Engine + Sync,
    C: StackContract,
{
    /// Creates a driver for the stack named `stack_name` in the contract's
    /// project.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Identity`] when the name is blank or holds
    /// characters the engine cannot store.
    pub fn new(engine: E, stack_name: &str) -> Result<Self, StackError<E::Error>> {
        let identity =
            StackIdentity::new(C::PROJECT_NAME, stack_name).map_err(StackError::Identity)?;
        Ok(Self {
            engine,
            identity,
            contract: PhantomData,
        })
    }

    /// Identity of the stack this driver owns.
    #[must_use]
    pub const fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    /// Engine the driver calls into.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Writes every configuration entry, overwriting previous values.
    ///
    /// A failure part way through leaves the stored configuration
    /// indeterminate; repeat the whole call to recover.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Config`] when the contract rejects the value
    /// and [`StackError::Engine`] when a write fails.
    #[instrument(skip_all, fields(stack = %self.identity))]
    pub async fn set_config(&self, config: &C::Config) -> Result<(), StackError<E::Error>> {
        C::validate_config(config).map_err(|source| StackError::Config {
            identity: self.identity.clone(),
            source,
        })?;
        self.select().await?;
        let entries = C::config_entries(config);
        for (key, value) in &entries {
            self.engine
                .set_config(&self.identity, key, value)
                .await
                .map_err(|source| self.engine_error(source))?;
        }
        let stored = self
            .engine
            .get_all_config(&self.identity)
            .await
            .map_err(|source| self.engine_error(source))?;
        debug!(config = ?stored, "stack configuration written");
        Ok(())
    }

    /// Reconciles the stack and returns its typed outputs.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Config`] when the stored configuration cannot
    /// produce a graph, [`StackError::Engine`] when reconciliation fails and
    /// [`StackError::OutputValidation`] when the outputs are unusable.
    pub async fn apply(&self) -> Result<C::Output, StackError<E::Error>> {
        let outputs = self.apply_raw().await?;
        C::build_typed_output(&outputs).map_err(|source| StackError::OutputValidation {
            identity: self.identity.clone(),
            source,
        })
    }

    /// Reconciles the stack and returns the untyped output map.
    ///
    /// The program is evaluated once against the stored configuration before
    /// the engine is asked to mutate anything, so configuration mistakes are
    /// reported as such rather than as engine failures. An output document
    /// that is not a map is an output validation failure.
    ///
    /// # Errors
    ///
    /// See [`StackDriver::apply`].
    #[instrument(skip_all, fields(stack = %self.identity))]
    pub async fn apply_raw(&self) -> Result<OutputMap, StackError<E::Error>> {
        self.select().await?;
        let stored = self
            .engine
            .get_all_config(&self.identity)
            .await
            .map_err(|source| self.engine_error(source))?;
        let context = ProgramContext::new(self.identity.clone(), stored);
        let declared = (C::PROGRAM)(&context).map_err(|source| StackError::Config {
            identity: self.identity.clone(),
            source,
        })?;
        debug!(resources = declared.resource_count(), "program preflight passed");

        info!("applying stack");
        let document = self
            .engine
            .up(&self.identity, C::PROGRAM)
            .await
            .map_err(|source| self.engine_error(source))?;
        let outputs = output_map(document).map_err(|source| StackError::OutputValidation {
            identity: self.identity.clone(),
            source,
        })?;
        info!(outputs = outputs.len(), "stack applied");
        Ok(outputs)
    }

    /// Tears down every resource recorded for the stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Engine`] when teardown fails; the engine leaves
    /// the recorded state in place in that case.
    #[instrument(skip_all, fields(stack = %self.identity))]
    pub async fn destroy(&self) -> Result<(), StackError<E::Error>> {
        self.select().await?;
        info!("destroying stack");
        self.engine
            .destroy(&self.identity)
            .await
            .map_err(|source| self.engine_error(source))?;
        info!("stack destroyed");
        Ok(())
    }

    async fn select(&self) -> Result<(), StackError<E::Error>> {
        self.engine
            .select_stack(&self.identity)
            .await
            .map_err(|source| self.engine_error(source))
    }

    fn engine_error(&self, source: E::Error) -> StackError<E::Error> {
        StackError::Engine {
            identity: self.identity.clone(),
            source,
        }
    }
}
