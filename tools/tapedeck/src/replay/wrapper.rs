//! Builds the replacement callables a session installs on its targets.

use crate::replay::recorder::{recording_suppressed, Recorder};
use crate::replay::replayer::ReplayMatcher;
use crate::replay::spec::CompiledSpec;
use crate::replay::target::{Callable, Installation};
use serde_json::Value;
use std::sync::Arc;

/// Where intercepted calls go for the lifetime of one session.
#[derive(Clone)]
pub enum SessionDriver {
    Recording(Arc<Recorder>),
    Playback(Arc<ReplayMatcher>),
}

impl SessionDriver {
    /// Recording pauses while the current thread is inside a captured call.
    fn is_active(&self) -> bool {
        match self {
            SessionDriver::Recording(_) => !recording_suppressed(),
            SessionDriver::Playback(_) => true,
        }
    }
}

/// Wrap `original` so calls through it are routed by `driver`. The wrapper
/// keeps the original's metadata.
pub fn wrap(spec: &CompiledSpec, original: Callable, driver: SessionDriver) -> Callable {
    let meta = original.meta().clone();
    let spec = spec.clone();
    Callable::with_meta(meta, move |raw_args: Vec<Value>| {
        let args = (spec.arg_transformer)(raw_args);
        if !driver.is_active() || !(spec.recordable)(&args) {
            return original.invoke(args);
        }
        match &driver {
            SessionDriver::Recording(recorder) => recorder.capture(&spec, &original, args),
            SessionDriver::Playback(matcher) => {
                let arg_key = (spec.arg_key_fn)(&args);
                matcher.lookup(spec.target_id(), &arg_key)
            }
        }
    })
}

/// One installed wrapper per spec; dropping the scope removes every one of them.
pub struct InterceptionScope {
    installations: Vec<Installation>,
}

impl InterceptionScope {
    pub fn install(specs: &[CompiledSpec], driver: &SessionDriver) -> Self {
        let installations = specs
            .iter()
            .map(|spec| {
                let (layer_spec, driver) = (spec.clone(), driver.clone());
                spec.target
                    .intercept(move |inner| wrap(&layer_spec, inner, driver.clone()))
            })
            .collect();
        Self { installations }
    }

    pub fn len(&self) -> usize {
        self.installations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installations.is_empty()
    }
}

impl Drop for InterceptionScope {
    fn drop(&mut self) {
        while let Some(installation) = self.installations.pop() {
            drop(installation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{wrap, InterceptionScope, SessionDriver};
    use crate::replay::recorder::Recorder;
    use crate::replay::recording::{CapturedCall, Cassette};
    use crate::replay::replayer::{OrderScope, ReplayMatcher};
    use crate::replay::spec::{compile_specs, InterceptionSpec};
    use crate::replay::target::{Callable, CallableMeta, Target};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn add_target() -> Arc<Target> {
        let meta = CallableMeta {
            name: "math::add".to_string(),
            doc: Some("Add two numbers.".to_string()),
            arity: Some(2),
        };
        Target::from_callable(
            "math::add",
            Callable::with_meta(meta, |args: Vec<Value>| {
                let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok(json!(sum))
            }),
        )
    }

    #[test]
    fn wrapper_carries_original_metadata() {
        let target = add_target();
        let compiled = compile_specs([InterceptionSpec::for_target(target.clone())]).expect("compile");
        let driver = SessionDriver::Recording(Arc::new(Recorder::new(None)));
        let wrapped = wrap(&compiled[0], target.current(), driver);
        assert_eq!(wrapped.meta(), target.current().meta());
        assert_eq!(wrapped.meta().arity, Some(2));
    }

    #[test]
    fn unrecordable_calls_reach_the_original_during_playback() {
        let target = add_target();
        let compiled = compile_specs([InterceptionSpec::for_target(target.clone())
            .recordable(|args| args.len() == 2)])
        .expect("compile");
        let cassette = Cassette::new(
            vec![CapturedCall {
                target_id: "math::add".to_string(),
                arg_key: json!([1, 2]),
                return_value: json!(100),
            }],
            0,
        );
        let matcher = Arc::new(ReplayMatcher::build(&cassette, OrderScope::PerKey).expect("matcher"));
        let scope = InterceptionScope::install(&compiled, &SessionDriver::Playback(matcher));
        assert_eq!(scope.len(), 1);
        assert_eq!(target.call(vec![json!(1), json!(2)]).expect("replayed"), json!(100));
        assert_eq!(target.call(vec![json!(1), json!(2), json!(3)]).expect("real"), json!(6));
        drop(scope);
        assert_eq!(target.call(vec![json!(1), json!(2)]).expect("restored"), json!(3));
    }

    #[test]
    fn arg_transformer_output_feeds_the_original() {
        let target = add_target();
        let compiled = compile_specs([InterceptionSpec::for_target(target.clone())
            .arg_transformer(|mut args| {
                args.push(json!(10));
                args
            })
            .recordable(|_| false)])
        .expect("compile");
        let recorder = Arc::new(Recorder::new(None));
        let _scope = InterceptionScope::install(&compiled, &SessionDriver::Recording(recorder.clone()));
        assert_eq!(target.call(vec![json!(1)]).expect("call"), json!(11));
        assert_eq!(recorder.len(), 0);
    }
}
