use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::{DecompilerEngine, EngineDescriptor};
use crate::error::DecompileResult;
use crate::prefs::PreferenceStore;

pub const PREF_SELECTED_DECOMPILER: &str = "selectedDecompiler";
pub const PREF_PRESERVE_LINE_NUMBERS: &str = "preserveLineNumbers";
pub const DEFAULT_DECOMPILER: &str = "cfr";
pub const DEFAULT_PRESERVE_LINE_NUMBERS: bool = true;

/// Registered engines in presentation order, plus the selection and realign preference.
///
/// Selection and preference live only in the store and are read on every call, so several
/// registries (or threads) sharing one store always agree.
#[derive(Clone)]
pub struct EngineRegistry {
    // Never empty: the first engine is registered at construction.
    engines: Vec<Arc<dyn DecompilerEngine>>,
    store: Arc<dyn PreferenceStore>,
}

impl EngineRegistry {
    pub fn new(store: Arc<dyn PreferenceStore>, first: impl DecompilerEngine + 'static) -> Self {
        Self {
            engines: vec![Arc::new(first)],
            store,
        }
    }

    /// Adds an engine. A second registration under the same id replaces the first in place.
    pub fn register(&mut self, engine: impl DecompilerEngine + 'static) -> &mut Self {
        let engine: Arc<dyn DecompilerEngine> = Arc::new(engine);
        let id = engine.descriptor().id;
        match self.engines.iter().position(|e| e.descriptor().id == id) {
            Some(idx) => self.engines[idx] = engine,
            None => self.engines.push(engine),
        }
        self
    }

    pub fn available_engines(&self) -> Vec<EngineDescriptor> {
        self.engines
            .iter()
            .map(|e| e.descriptor().clone())
            .collect()
    }

    pub fn engine(&self, id: &str) -> Option<Arc<dyn DecompilerEngine>> {
        self.engines
            .iter()
            .find(|e| e.descriptor().id == id)
            .cloned()
    }

    /// The id stored in preferences, whether or not it is registered.
    pub fn selected_engine_id(&self) -> String {
        self.store.get_or(PREF_SELECTED_DECOMPILER, DEFAULT_DECOMPILER)
    }

    /// The selected engine. An unknown stored id falls back to the default engine, or to the
    /// first registered one when no engine carries the default id.
    pub fn selected_engine(&self) -> Arc<dyn DecompilerEngine> {
        let selected = self.selected_engine_id();
        if let Some(engine) = self.engine(&selected) {
            return engine;
        }
        debug!(selected, "stored engine not registered, using default");
        self.engine(DEFAULT_DECOMPILER)
            .unwrap_or_else(|| Arc::clone(&self.engines[0]))
    }

    /// Persists `id` as the selection. Unregistered ids are ignored.
    pub fn set_selected(&self, id: &str) -> DecompileResult<()> {
        if self.engine(id).is_none() {
            debug!(id, "ignoring selection of unregistered engine");
            return Ok(());
        }
        self.store
            .put(PREF_SELECTED_DECOMPILER, id)
            .inspect_err(|e| warn!("failed to persist engine selection: {e}"))
    }

    pub fn realign_preference(&self) -> bool {
        self.store
            .get_bool(PREF_PRESERVE_LINE_NUMBERS, DEFAULT_PRESERVE_LINE_NUMBERS)
    }

    pub fn set_realign_preference(&self, preserve: bool) -> DecompileResult<()> {
        self.store
            .put_bool(PREF_PRESERVE_LINE_NUMBERS, preserve)
            .inspect_err(|e| warn!("failed to persist realign preference: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::with_footer;
    use crate::prefs::MemoryStore;
    use crate::resolver::{ClassId, ClassResolver};

    struct Named(EngineDescriptor);

    impl DecompilerEngine for Named {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.0
        }

        fn decompile(
            &self,
            _class_id: &ClassId,
            _bytes: &[u8],
            _resolver: &dyn ClassResolver,
            _preserve_lines: bool,
        ) -> DecompileResult<String> {
            Ok(with_footer(String::new(), &self.0))
        }
    }

    fn named(id: &'static str) -> Named {
        Named(EngineDescriptor {
            id,
            display_name: id,
            description: "test engine",
        })
    }

    fn registry(store: Arc<dyn PreferenceStore>) -> EngineRegistry {
        let mut registry = EngineRegistry::new(store, named("cfr"));
        registry
            .register(named("jd-core"))
            .register(named("procyon"))
            .register(named("vineflower"));
        registry
    }

    #[test]
    fn keeps_registration_order() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let ids: Vec<&str> = registry.available_engines().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["cfr", "jd-core", "procyon", "vineflower"]);
        assert!(registry.engine("procyon").is_some());
        assert!(registry.engine("javap").is_none());
    }

    #[test]
    fn fresh_store_selects_default() {
        let registry = registry(Arc::new(MemoryStore::new()));
        assert_eq!(registry.selected_engine().descriptor().id, "cfr");
        assert!(registry.realign_preference());
    }

    #[test]
    fn unknown_selection_is_ignored() -> DecompileResult<()> {
        let registry = registry(Arc::new(MemoryStore::new()));
        registry.set_selected("procyon")?;
        registry.set_selected("does-not-exist")?;
        assert_eq!(registry.selected_engine().descriptor().id, "procyon");
        Ok(())
    }

    #[test]
    fn stale_stored_id_falls_back_to_default() -> DecompileResult<()> {
        let store = Arc::new(MemoryStore::new());
        store.put(PREF_SELECTED_DECOMPILER, "removed-engine")?;
        let registry = registry(store);
        assert_eq!(registry.selected_engine_id(), "removed-engine");
        assert_eq!(registry.selected_engine().descriptor().id, "cfr");
        Ok(())
    }

    #[test]
    fn falls_back_to_first_engine_without_default_id() {
        let registry = EngineRegistry::new(Arc::new(MemoryStore::new()), named("only"));
        assert_eq!(registry.selected_engine().descriptor().id, "only");
    }

    #[test]
    fn changes_are_visible_through_shared_store() -> DecompileResult<()> {
        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryStore::new());
        let ui = registry(Arc::clone(&store));
        let worker = registry(store);

        ui.set_selected("vineflower")?;
        ui.set_realign_preference(false)?;
        assert_eq!(worker.selected_engine().descriptor().id, "vineflower");
        assert!(!worker.realign_preference());
        Ok(())
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut registry = registry(Arc::new(MemoryStore::new()));
        registry.register(Named(EngineDescriptor {
            id: "jd-core",
            display_name: "JD (patched)",
            description: "replacement",
        }));
        let engines = registry.available_engines();
        assert_eq!(engines.len(), 4);
        assert_eq!(engines[1].display_name, "JD (patched)");
    }
}
