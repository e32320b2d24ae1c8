//! Built-in flows.

use flowline_core::runtime::Runtime;
use std::sync::Arc;

/// Counting pass-through.
pub mod count;
/// Identity transducer.
pub mod pass;
/// Field based router.
pub mod route;

/// Registers every built-in flow.
pub fn register_builtin(runtime: &mut Runtime) {
    runtime.register_flow(pass::PATH, Arc::new(pass::create), pass::metadata());
    runtime.register_flow(route::PATH, Arc::new(route::create), route::metadata());
    runtime.register_flow(count::PATH, Arc::new(count::create), count::metadata());
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::registry::Resolution;

    #[test]
    fn test_register_builtin() {
        let mut runtime = Runtime::new();
        register_builtin(&mut runtime);

        for path in [pass::PATH, route::PATH, count::PATH] {
            assert!(runtime.registry().get(path).is_some(), "{path} missing");
        }
        let resolved = runtime.resolve_config(route::PATH, "$default").unwrap();
        assert_eq!(resolved.params["field"], "type");
        assert!(matches!(
            runtime.resolve_path(&["core".to_string()]),
            Resolution::Namespace { .. }
        ));
    }
}
