use std::collections::{HashMap, HashSet};

use crate::config::DuplicatePolicy;
use crate::descriptors::{ProviderDescriptor, Recipe};
use crate::error::{DiError, DiResult};
use crate::metadata::{keys, MetadataStore};
use crate::registration::RegistryEntry;
use crate::token::Token;

use super::{ExportSpec, Module, ModuleDef, ModuleId, ModuleImport, ModuleKey, ModuleRef};

/// The scanned module graph.
///
/// Built once by [`scan`](Self::scan) and read-only afterwards. Each distinct
/// module key yields exactly one [`ModuleRef`], however many import paths
/// lead to it.
pub struct ModuleGraph {
    modules: Vec<ModuleRef>,
    index: HashMap<ModuleKey, ModuleId>,
    // dependency-first: every module after the modules it imports
    order: Vec<ModuleId>,
    globals: Vec<ModuleId>,
    root: ModuleId,
}

struct Scanner {
    modules: Vec<ModuleRef>,
    index: HashMap<ModuleKey, ModuleId>,
    order: Vec<ModuleId>,
    exports: Vec<(ModuleId, Vec<ExportSpec>)>,
    metadata: MetadataStore,
    policy: DuplicatePolicy,
}

impl ModuleGraph {
    /// Scans the graph rooted at the static module `M`.
    pub fn scan_module<M: Module>(policy: DuplicatePolicy) -> DiResult<(ModuleGraph, MetadataStore)> {
        Self::scan(M::define(), policy)
    }

    /// Scans the graph rooted at `root`.
    ///
    /// Traversal is depth-first; a module is marked visited before its
    /// imports are scanned, so import cycles terminate. Providers and
    /// controllers are registered after the module's imports, and their
    /// declarations are applied to the returned [`MetadataStore`].
    pub fn scan(root: ModuleDef, policy: DuplicatePolicy) -> DiResult<(ModuleGraph, MetadataStore)> {
        let mut scanner = Scanner {
            modules: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            exports: Vec::new(),
            metadata: MetadataStore::new(),
            policy,
        };
        let root = scanner.visit(root)?;
        scanner.link_exports()?;

        let globals = scanner
            .order
            .iter()
            .copied()
            .filter(|id| scanner.modules[id.0].global)
            .collect();

        let graph = ModuleGraph {
            modules: scanner.modules,
            index: scanner.index,
            order: scanner.order,
            globals,
            root,
        };
        graph.check_exports()?;

        tracing::debug!(
            modules = graph.modules.len(),
            root = %graph.modules[root.0].name,
            "module graph scanned"
        );
        Ok((graph, scanner.metadata))
    }

    /// Root module id.
    pub fn root(&self) -> ModuleId {
        self.root
    }

    /// Module by id.
    pub fn module(&self, id: ModuleId) -> &ModuleRef {
        &self.modules[id.0]
    }

    pub(crate) fn module_mut(&mut self, id: ModuleId) -> &mut ModuleRef {
        &mut self.modules[id.0]
    }

    /// Modules in dependency-first order.
    pub fn modules(&self) -> impl DoubleEndedIterator<Item = &ModuleRef> {
        self.order.iter().map(move |id| &self.modules[id.0])
    }

    /// Number of distinct modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True when the graph holds no module.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Id of the static module `M`, if it was scanned.
    pub fn find<M: 'static>(&self) -> Option<ModuleId> {
        self.find_key(&ModuleKey::of::<M>())
    }

    /// Id of the module with `key`, if it was scanned.
    pub fn find_key(&self, key: &ModuleKey) -> Option<ModuleId> {
        self.index.get(key).copied()
    }

    /// True when `token` resolves from module `from`.
    pub fn is_visible(&self, from: ModuleId, token: &Token) -> bool {
        self.locate(from, token).is_some()
    }

    /// Finds the descriptor `from` sees for `token` and the module owning it.
    ///
    /// Lookup order: the module's own providers, then each import's exports
    /// in import order, then global modules.
    pub(crate) fn locate(&self, from: ModuleId, token: &Token) -> Option<(ModuleId, &RegistryEntry)> {
        let module = &self.modules[from.0];
        if let Some(entry) = module.registry.entry(token) {
            return Some((from, entry));
        }

        let mut visited = HashSet::new();
        visited.insert(from);
        for import in &module.imports {
            if let Some(found) = self.exported_by(*import, token, &mut visited) {
                return Some(found);
            }
        }
        for global in &self.globals {
            if let Some(found) = self.exported_by(*global, token, &mut visited) {
                return Some(found);
            }
        }
        None
    }

    // what `id` exposes to its importers
    fn exported_by(
        &self,
        id: ModuleId,
        token: &Token,
        visited: &mut HashSet<ModuleId>,
    ) -> Option<(ModuleId, &RegistryEntry)> {
        if !visited.insert(id) {
            return None;
        }
        let module = &self.modules[id.0];
        if module.exported_tokens.contains(token) {
            if let Some(entry) = module.registry.entry(token) {
                return Some((id, entry));
            }
            for import in &module.imports {
                if let Some(found) = self.exported_by(*import, token, visited) {
                    return Some(found);
                }
            }
        }
        for exported in &module.exported_modules {
            if let Some(found) = self.exported_by(*exported, token, visited) {
                return Some(found);
            }
        }
        None
    }

    fn check_exports(&self) -> DiResult<()> {
        for module in &self.modules {
            for token in &module.exported_tokens {
                if module.registry.contains(token) {
                    continue;
                }
                let mut visited = HashSet::new();
                visited.insert(module.id);
                let imported = module
                    .imports
                    .iter()
                    .any(|import| self.exported_by(*import, token, &mut visited).is_some());
                if !imported {
                    return Err(DiError::UnknownExport {
                        module: module.name.clone(),
                        token: token.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Registers `descriptor` in module `id` unless the token is present.
    pub(crate) fn register_if_absent(
        &mut self,
        id: ModuleId,
        descriptor: ProviderDescriptor,
        metadata: &mut MetadataStore,
    ) {
        apply_provider_metadata(&descriptor, metadata);
        self.modules[id.0].registry.register_if_absent(descriptor);
    }
}

impl std::fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("root", &self.root)
            .field("modules", &self.order.iter().map(|id| &self.modules[id.0].name).collect::<Vec<_>>())
            .finish()
    }
}

impl Scanner {
    fn visit(&mut self, def: ModuleDef) -> DiResult<ModuleId> {
        if let Some(id) = self.index.get(&def.key) {
            return Ok(*id);
        }

        let id = ModuleId(self.modules.len());
        self.index.insert(def.key.clone(), id);
        self.modules.push(ModuleRef::new(id, def.key, def.global));
        tracing::trace!(module = %self.modules[id.0].name, "scanning module");

        let mut imports = Vec::with_capacity(def.imports.len());
        for import in def.imports {
            let child = match import {
                ModuleImport::Lazy(define) => define(),
                ModuleImport::Def(def) => *def,
            };
            let child_id = self.visit(child)?;
            if !imports.contains(&child_id) {
                imports.push(child_id);
            }
        }
        self.modules[id.0].imports = imports;

        for descriptor in def.providers {
            apply_provider_metadata(&descriptor, &mut self.metadata);
            self.modules[id.0].registry.register(descriptor, self.policy)?;
        }

        for controller in def.controllers {
            let module = &mut self.modules[id.0];
            let token = controller.apply(&mut module.registry, &mut self.metadata, self.policy)?;
            module.controllers.push(token);
        }

        for binding in def.middleware {
            if let Some(descriptor) = binding.middleware.provider() {
                apply_provider_metadata(&descriptor, &mut self.metadata);
                self.modules[id.0].registry.register_if_absent(descriptor);
            }
            self.modules[id.0].middleware.push(binding);
        }

        self.exports.push((id, def.exports));
        self.order.push(id);
        Ok(id)
    }

    fn link_exports(&mut self) -> DiResult<()> {
        for (id, specs) in std::mem::take(&mut self.exports) {
            for spec in specs {
                match spec {
                    ExportSpec::Token(token) => {
                        self.modules[id.0].exported_tokens.insert(token);
                    }
                    ExportSpec::Module(key) => {
                        let target = self
                            .index
                            .get(&key)
                            .copied()
                            .filter(|target| self.modules[id.0].imports.contains(target));
                        match target {
                            Some(target) => self.modules[id.0].exported_modules.push(target),
                            None => {
                                return Err(DiError::UnknownExport {
                                    module: self.modules[id.0].name.clone(),
                                    token: key.name(),
                                })
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Records a class provider's constructor metadata.
pub(crate) fn apply_provider_metadata(descriptor: &ProviderDescriptor, metadata: &mut MetadataStore) {
    if let Recipe::Class { target, .. } = &descriptor.recipe {
        metadata.set_metadata(keys::PARAM_TYPES, descriptor.dependencies(), target, None);
        metadata.set_metadata(keys::SCOPE, descriptor.lifetime, target, None);
    }
}
