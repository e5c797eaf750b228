//! Lifecycle of the single running sketch instance
//!
//! The manager owns the only handle to the active instance. Every `run`
//! retires the previous instance before anything else happens, and every
//! fault raised by generated code (error or panic) is turned into a
//! [`RunOutcome::Failed`] at this boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use log::{debug, error, info, warn};

/// Name of the function the outer template defines
pub const ENTRY_POINT_NAME: &str = "sketch";

/// Wrap a generated body in the fixed instance-mode template
pub fn wrap_sketch_source(code_body: &str) -> String
{   format!(
      "const {} = function(p) {{\n{}\n}};\n",
      ENTRY_POINT_NAME, code_body
    )
}

/// Callable produced from generated source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint
{   /// Function name bound by the template
    pub name: String
  , /// Complete wrapped source
    pub source: String
  , /// Lifecycle hooks the body assigns (`setup`, `draw`, ...)
    pub hooks: Vec<String>
}

/// Turns untrusted wrapped source into an entry point.
///
/// `Ok(None)` means the source evaluated but did not define the entry
/// point contract.
pub trait SketchCompiler: Send
{   fn compile(&self, wrapped_source: &str)
      -> Result<Option<EntryPoint>, crate::error::Error>;
}

/// A live sketch; `remove` releases everything it holds
pub trait SketchInstance: Send
{   fn remove(&mut self);
}

/// Visual runtime: builds one instance from an entry point
pub trait SketchRuntime: Send
{   fn construct(
      &mut self
    , entry: &EntryPoint
    , mount_id: &str
    ) -> Result<Box<dyn SketchInstance>, crate::error::Error>;
}

/// The presentation area a sketch mounts into
pub trait Stage: Send
{   /// Show the empty/placeholder state
    fn reset(&mut self) -> Result<(), crate::error::Error>;

    /// Drop the placeholder right before an instance is constructed
    fn clear(&mut self) -> Result<(), crate::error::Error>;
}

/// Result of one `run` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome
{   /// A new instance is active
    Started
  , /// Blank body; nothing was constructed
    NothingToRun
  , /// Construction failed; no instance is active
    Failed(crate::error::Error)
}

impl RunOutcome
{   pub fn is_started(&self) -> bool
    {   matches!(self, RunOutcome::Started)
    }

    pub fn error(&self) -> Option<&crate::error::Error>
    {   match self
        {   RunOutcome::Failed(e) => Some(e)
          , _ => None
        }
    }
}

/// Owner of the single active sketch instance
pub struct SketchRuntimeManager
{   compiler: Box<dyn SketchCompiler>
  , runtime: Box<dyn SketchRuntime>
  , stage: Box<dyn Stage>
  , mount_id: String
  , active: Option<Box<dyn SketchInstance>>
}

impl SketchRuntimeManager
{   pub fn new(
      compiler: Box<dyn SketchCompiler>
    , runtime: Box<dyn SketchRuntime>
    , stage: Box<dyn Stage>
    , mount_id: impl Into<String>
    ) -> Self
    {   SketchRuntimeManager
        {   compiler
          , runtime
          , stage
          , mount_id: mount_id.into()
          , active: None
        }
    }

    pub fn is_active(&self) -> bool
    {   self.active.is_some()
    }

    pub fn mount_id(&self) -> &str
    {   &self.mount_id
    }

    /// Replace whatever is running with `code_body`
    pub fn run(&mut self, code_body: &str) -> RunOutcome
    {   self.teardown();

        if let Err(e) = self.stage.reset()
        {   warn!("Failed to reset presentation area: {}", e);
        }

        if code_body.trim().is_empty()
        {   debug!("Empty code body; nothing to run");
            return RunOutcome::NothingToRun;
        }

        let wrapped = wrap_sketch_source(code_body);
        let entry = match self.materialize(&wrapped)
        {   Ok(entry) => entry
          , Err(e) => {
              error!("Error executing sketch code: {}", e);
              return RunOutcome::Failed(e);
            }
        };

        if let Err(e) = self.stage.clear()
        {   warn!("Failed to clear presentation area: {}", e);
        }

        let mount_id = self.mount_id.clone();
        let runtime = &mut self.runtime;
        let constructed = panic::catch_unwind(AssertUnwindSafe(|| {
          runtime.construct(&entry, &mount_id)
        }));
        // The entry point is transient; only the instance survives.
        drop(entry);

        match constructed
        {   Ok(Ok(instance)) => {
              info!("Sketch instance started in #{}", self.mount_id);
              self.active = Some(instance);
              RunOutcome::Started
            }
          , Ok(Err(e)) => {
              error!("Sketch construction failed: {}", e);
              RunOutcome::Failed(construction_failure(e))
            }
          , Err(payload) => {
              let cause = panic_message(payload.as_ref());
              error!("Sketch construction panicked: {}", cause);
              RunOutcome::Failed(
                crate::error::Error::RuntimeConstruction(cause)
              )
            }
        }
    }

    /// Tear down the active instance, if any, and put the placeholder
    /// back. Returns whether an instance was removed.
    pub fn cleanup(&mut self) -> bool
    {   if !self.teardown()
        {   return false;
        }
        if let Err(e) = self.stage.reset()
        {   warn!("Failed to reset presentation area: {}", e);
        }
        true
    }

    /// Let go of the active instance without tearing it down, so it
    /// outlives the manager. Returns whether an instance was held.
    pub fn release(&mut self) -> bool
    {   match self.active.take()
        {   Some(_) => {
              debug!("Releasing active sketch instance");
              true
            }
          , None => false
        }
    }

    fn teardown(&mut self) -> bool
    {   let Some(mut instance) = self.active.take()
        else
        {   return false;
        };
        debug!("Removing active sketch instance");
        let removed = panic::catch_unwind(AssertUnwindSafe(|| {
          instance.remove()
        }));
        if let Err(payload) = removed
        {   error!(
              "Sketch teardown panicked: {}",
              panic_message(payload.as_ref())
            );
        }
        true
    }

    fn materialize(&self, wrapped: &str)
      -> Result<EntryPoint, crate::error::Error>
    {   let compiler = &self.compiler;
        let compiled = panic::catch_unwind(AssertUnwindSafe(|| {
          compiler.compile(wrapped)
        }));
        match compiled
        {   Ok(Ok(Some(entry))) => Ok(entry)
          , Ok(Ok(None)) => Err(
              crate::error::Error::RuntimeConstruction(
                "AI response did not generate the required sketch \
                 function structure."
                  .to_string()
              )
            )
          , Ok(Err(e)) => Err(construction_failure(e))
          , Err(payload) => Err(
              crate::error::Error::RuntimeConstruction(
                panic_message(payload.as_ref())
              )
            )
        }
    }
}

fn construction_failure(e: crate::error::Error) -> crate::error::Error
{   match e
    {   crate::error::Error::RuntimeConstruction(_) => e
      , other => crate::error::Error::RuntimeConstruction(
          other.to_string()
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String
{   if let Some(s) = payload.downcast_ref::<&str>()
    {   s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>()
    {   s.clone()
    } else
    {   "generated code panicked".to_string()
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::sync::{Arc, Mutex};
    use crate::error::Error;

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String>
    {   log.lock().unwrap().clone()
    }

    /// Accepts bodies containing `p.draw`, errors on `syntax error`,
    /// panics on `boom`
    struct FakeCompiler
    {   log: Log
    }

    impl SketchCompiler for FakeCompiler
    {   fn compile(&self, wrapped: &str)
          -> Result<Option<EntryPoint>, Error>
        {   self.log.lock().unwrap().push("compile".to_string());
            if wrapped.contains("boom")
            {   panic!("boom");
            }
            if wrapped.contains("syntax error")
            {   return Err(Error::RuntimeConstruction(
                  "SyntaxError: Unexpected token".to_string()
                ));
            }
            if !wrapped.contains("p.draw")
            {   return Ok(None);
            }
            Ok(Some(EntryPoint
            {   name: ENTRY_POINT_NAME.to_string()
              , source: wrapped.to_string()
              , hooks: vec!["draw".to_string()]
            }))
        }
    }

    struct FakeInstance
    {   id: usize
      , log: Log
    }

    impl SketchInstance for FakeInstance
    {   fn remove(&mut self)
        {   self.log.lock().unwrap()
              .push(format!("remove #{}", self.id));
        }
    }

    struct FakeRuntime
    {   log: Log
      , built: usize
      , fail_next: bool
    }

    impl SketchRuntime for FakeRuntime
    {   fn construct(
          &mut self
        , entry: &EntryPoint
        , mount_id: &str
        ) -> Result<Box<dyn SketchInstance>, Error>
        {   assert_eq!(entry.name, ENTRY_POINT_NAME);
            if self.fail_next
            {   self.fail_next = false;
                return Err(Error::Other("p5 is not defined".to_string()));
            }
            self.built += 1;
            self.log.lock().unwrap()
              .push(format!("construct #{} in {}", self.built, mount_id));
            Ok(Box::new(FakeInstance
            {   id: self.built
              , log: self.log.clone()
            }))
        }
    }

    struct FakeStage
    {   log: Log
    }

    impl Stage for FakeStage
    {   fn reset(&mut self) -> Result<(), Error>
        {   self.log.lock().unwrap().push("reset".to_string());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), Error>
        {   self.log.lock().unwrap().push("clear".to_string());
            Ok(())
        }
    }

    fn manager_with(fail_construct: bool) -> (SketchRuntimeManager, Log)
    {   let log: Log = Arc::new(Mutex::new(vec![]));
        let manager = SketchRuntimeManager::new(
          Box::new(FakeCompiler { log: log.clone() })
        , Box::new(FakeRuntime
          {   log: log.clone()
            , built: 0
            , fail_next: fail_construct
          })
        , Box::new(FakeStage { log: log.clone() })
        , "canvas-container"
        );
        (manager, log)
    }

    const VALID: &str = "p.draw = function() { p.background(0); };";

    #[test]
    fn template_defines_entry_point()
    {   let wrapped = wrap_sketch_source("p.setup = () => {};");
        assert!(wrapped.starts_with("const sketch = function(p) {\n"));
        assert!(wrapped.contains("p.setup = () => {};"));
        assert!(wrapped.trim_end().ends_with("};"));
    }

    #[test]
    fn second_run_replaces_first_instance()
    {   let (mut manager, log) = manager_with(false);

        assert_eq!(manager.run(VALID), RunOutcome::Started);
        assert_eq!(manager.run(VALID), RunOutcome::Started);

        assert!(manager.is_active());
        let log = entries(&log);
        assert_eq!(
          log.iter().filter(|e| *e == "remove #1").count(), 1
        );
        assert!(!log.iter().any(|e| e == "remove #2"));
        assert_eq!(
          log,
          vec![
            "reset", "compile", "clear", "construct #1 in canvas-container",
            "remove #1", "reset", "compile", "clear",
            "construct #2 in canvas-container",
          ]
        );
    }

    #[test]
    fn blank_body_tears_down_and_resets_only()
    {   let (mut manager, log) = manager_with(false);
        manager.run(VALID);
        log.lock().unwrap().clear();

        assert_eq!(manager.run("  \n\t"), RunOutcome::NothingToRun);
        assert!(!manager.is_active());
        assert_eq!(entries(&log), vec!["remove #1", "reset"]);
    }

    #[test]
    fn missing_entry_point_leaves_no_instance()
    {   let (mut manager, log) = manager_with(false);

        let outcome = manager.run("let x = 1;");

        assert!(matches!(
          outcome,
          RunOutcome::Failed(Error::RuntimeConstruction(_))
        ));
        assert!(!manager.is_active());
        assert!(!manager.cleanup());
        assert!(!entries(&log).iter().any(|e| e.starts_with("construct")));
    }

    #[test]
    fn compile_error_is_reported_with_cause()
    {   let (mut manager, _log) = manager_with(false);
        manager.run(VALID);

        let outcome = manager.run("syntax error p.draw");

        assert_eq!(
          outcome.error(),
          Some(&Error::RuntimeConstruction(
            "SyntaxError: Unexpected token".to_string()
          ))
        );
        assert!(!manager.is_active());
    }

    #[test]
    fn compiler_panic_is_contained()
    {   let (mut manager, _log) = manager_with(false);

        let outcome = manager.run("boom p.draw");

        assert_eq!(
          outcome,
          RunOutcome::Failed(Error::RuntimeConstruction("boom".to_string()))
        );
        assert!(!manager.is_active());
        assert_eq!(manager.run(VALID), RunOutcome::Started);
    }

    #[test]
    fn failed_construction_records_nothing()
    {   let (mut manager, log) = manager_with(true);

        let outcome = manager.run(VALID);

        assert_eq!(
          outcome,
          RunOutcome::Failed(Error::RuntimeConstruction(
            "Error: p5 is not defined".to_string()
          ))
        );
        assert!(!manager.is_active());
        assert!(!manager.cleanup());
        assert!(!entries(&log).iter().any(|e| e.starts_with("remove")));
    }

    #[test]
    fn cleanup_is_idempotent()
    {   let (mut manager, log) = manager_with(false);
        assert!(!manager.cleanup());
        manager.run(VALID);

        assert!(manager.cleanup());
        assert!(!manager.cleanup());
        assert_eq!(
          entries(&log).iter().filter(|e| e.starts_with("remove")).count(),
          1
        );
    }

    #[test]
    fn cleanup_restores_placeholder()
    {   let (mut manager, log) = manager_with(false);
        manager.run(VALID);
        log.lock().unwrap().clear();

        assert!(manager.cleanup());
        assert!(!manager.cleanup());
        assert_eq!(entries(&log), vec!["remove #1", "reset"]);
    }

    #[test]
    fn released_instance_is_not_torn_down()
    {   let (mut manager, log) = manager_with(false);
        manager.run(VALID);

        assert!(manager.release());
        assert!(!manager.is_active());
        assert!(!manager.release());
        assert!(!manager.cleanup());
        drop(manager);
        assert!(!entries(&log).iter().any(|e| e.starts_with("remove")));
    }

    #[test]
    fn teardown_panic_still_empties_slot()
    {   struct Exploding;
        impl SketchInstance for Exploding
        {   fn remove(&mut self) { panic!("remove failed"); }
        }
        struct ExplodingRuntime;
        impl SketchRuntime for ExplodingRuntime
        {   fn construct(
              &mut self
            , _entry: &EntryPoint
            , _mount_id: &str
            ) -> Result<Box<dyn SketchInstance>, Error>
            {   Ok(Box::new(Exploding))
            }
        }

        let log: Log = Arc::new(Mutex::new(vec![]));
        let mut manager = SketchRuntimeManager::new(
          Box::new(FakeCompiler { log: log.clone() })
        , Box::new(ExplodingRuntime)
        , Box::new(FakeStage { log })
        , "canvas-container"
        );
        assert!(manager.run(VALID).is_started());

        assert!(manager.cleanup());
        assert!(!manager.is_active());
    }
}
