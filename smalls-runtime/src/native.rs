use std::collections::HashMap;

use smalls_types::TypeId;

/// Signature of one native (host-implemented) function, as the resolver
/// needs it to type-check calls without seeing a body: a script function
/// marked `native` must match one of these exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFunctionSignature {
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
}

/// A named group of native functions and opaque types the native-function
/// bridge provides to scripts -- e.g. `"io"` exposing `read_file(string):
/// string`. The bridge itself is out of scope here; this is only the
/// description the resolver consults when it sees `native` declarations
/// and `opaque` types.
#[derive(Debug, Clone, Default)]
pub struct NativeModule {
    pub name: String,
    pub functions: HashMap<String, NativeFunctionSignature>,
    pub opaque_types: Vec<String>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            opaque_types: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: impl Into<String>, signature: NativeFunctionSignature) -> Self {
        self.functions.insert(name.into(), signature);
        self
    }

    pub fn with_opaque_type(mut self, name: impl Into<String>) -> Self {
        self.opaque_types.push(name.into());
        self
    }
}

/// Registry of native modules installed into a runtime, keyed by name.
#[derive(Debug, Default)]
pub struct NativeModuleRegistry {
    modules: HashMap<String, NativeModule>,
}

impl NativeModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: NativeModule) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn get(&self, name: &str) -> Option<&NativeModule> {
        self.modules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_module_is_retrievable_by_name() {
        let mut registry = NativeModuleRegistry::new();
        let module = NativeModule::new("io")
            .with_function(
                "read_file",
                NativeFunctionSignature { params: vec![TypeId::STRING], return_type: TypeId::STRING },
            )
            .with_opaque_type("FileHandle");
        registry.register(module);

        let found = registry.get("io").expect("module should be registered");
        assert!(found.functions.contains_key("read_file"));
        assert_eq!(found.opaque_types, vec!["FileHandle".to_string()]);
    }

    #[test]
    fn unknown_module_name_is_none() {
        let registry = NativeModuleRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
