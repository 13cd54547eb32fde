//! Module declarations and the scanned module graph.
//!
//! A module bundles providers, controllers, imports and exports. Modules are
//! declared with [`ModuleDef`] builders and discovered by
//! [`ModuleGraph::scan`] starting from the root module.

mod graph;

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::controller::ControllerDef;
use crate::descriptors::ProviderDescriptor;
use crate::pipeline::{Enhancer, Middleware, MiddlewareBinding};
use crate::registration::ProviderRegistry;
use crate::router::RouteFilter;
use crate::token::{short_type_name, Token};

pub use graph::ModuleGraph;

pub(crate) use graph::apply_provider_metadata;

/// Index of a scanned module inside its [`ModuleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    /// Position in scan order of discovery.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A module type.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use ferrous_nest::{DiResult, Injectable, Injected, Module, ModuleDef};
///
/// struct UserService;
///
/// #[async_trait]
/// impl Injectable for UserService {
///     async fn construct(_: Injected) -> DiResult<Self> {
///         Ok(UserService)
///     }
/// }
///
/// struct UsersModule;
///
/// impl Module for UsersModule {
///     fn define() -> ModuleDef {
///         ModuleDef::new::<Self>()
///             .provider_class::<UserService>()
///             .export::<UserService>()
///     }
/// }
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn define() -> ModuleDef {
///         ModuleDef::new::<Self>().import::<UsersModule>()
///     }
/// }
/// ```
pub trait Module: 'static {
    /// Declares the module's imports, providers, controllers and exports.
    fn define() -> ModuleDef;
}

/// Identity of a module node.
///
/// Static modules are identified by type. Dynamic modules are identified by
/// type plus a fingerprint of their configuration, so the same module type
/// configured twice yields two nodes and configured identically yields one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ModuleKey {
    /// Plain module type
    Static {
        /// Module type
        type_id: TypeId,
        /// Type name for diagnostics
        name: &'static str,
    },
    /// Configured instance of a module type
    Dynamic {
        /// Module type
        type_id: TypeId,
        /// Type name for diagnostics
        name: &'static str,
        /// Configuration fingerprint
        fingerprint: String,
    },
}

impl ModuleKey {
    /// Key of the static module `M`.
    pub fn of<M: 'static>() -> Self {
        ModuleKey::Static {
            type_id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    /// Key of `M` configured with `fingerprint`.
    pub fn dynamic<M: 'static>(fingerprint: impl Into<String>) -> Self {
        ModuleKey::Dynamic {
            type_id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Short display name.
    pub fn name(&self) -> String {
        match self {
            ModuleKey::Static { name, .. } => short_type_name(name).to_string(),
            ModuleKey::Dynamic { name, fingerprint, .. } => {
                format!("{}({})", short_type_name(name), fingerprint)
            }
        }
    }
}

impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleKey({})", self.name())
    }
}

pub(crate) enum ModuleImport {
    Lazy(fn() -> ModuleDef),
    Def(Box<ModuleDef>),
}

pub(crate) enum ExportSpec {
    Token(Token),
    Module(ModuleKey),
}

/// Module declaration builder.
///
/// Builder calls play the role of the module decorator. Imports are scanned
/// depth-first before the module's own providers are registered.
pub struct ModuleDef {
    pub(crate) key: ModuleKey,
    pub(crate) global: bool,
    pub(crate) imports: Vec<ModuleImport>,
    pub(crate) providers: Vec<ProviderDescriptor>,
    pub(crate) controllers: Vec<ControllerDef>,
    pub(crate) exports: Vec<ExportSpec>,
    pub(crate) middleware: Vec<MiddlewareBinding>,
}

impl ModuleDef {
    fn with_key(key: ModuleKey) -> Self {
        Self {
            key,
            global: false,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Declaration of the static module `M`.
    pub fn new<M: 'static>() -> Self {
        Self::with_key(ModuleKey::of::<M>())
    }

    /// Declaration of `M` configured with `fingerprint`.
    ///
    /// Typically returned from a `M::for_root(options)` style constructor
    /// that adds providers built from the options.
    pub fn dynamic<M: 'static>(fingerprint: impl Into<String>) -> Self {
        Self::with_key(ModuleKey::dynamic::<M>(fingerprint))
    }

    /// Makes the module's exports visible to every module without import.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Imports the static module `M`.
    pub fn import<M: Module>(mut self) -> Self {
        self.imports.push(ModuleImport::Lazy(M::define));
        self
    }

    /// Imports a dynamic module declaration.
    pub fn import_dynamic(mut self, module: ModuleDef) -> Self {
        self.imports.push(ModuleImport::Def(Box::new(module)));
        self
    }

    /// Declares a provider.
    pub fn provider(mut self, descriptor: ProviderDescriptor) -> Self {
        self.providers.push(descriptor);
        self
    }

    /// Declares several providers.
    pub fn providers(mut self, descriptors: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        self.providers.extend(descriptors);
        self
    }

    /// Declares the class provider `T` under its own token.
    pub fn provider_class<T: crate::Injectable>(self) -> Self {
        self.provider(ProviderDescriptor::class::<T>())
    }

    /// Declares a controller.
    pub fn controller(mut self, controller: ControllerDef) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Exports the provider of type `T`.
    pub fn export<T: ?Sized + 'static>(self) -> Self {
        self.export_token(Token::of::<T>())
    }

    /// Exports a provider token, own or re-exported from an import.
    pub fn export_token(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(ExportSpec::Token(token.into()));
        self
    }

    /// Re-exports everything the imported module `M` exports.
    pub fn export_module<M: Module>(mut self) -> Self {
        self.exports.push(ExportSpec::Module(ModuleKey::of::<M>()));
        self
    }

    /// Re-exports an imported dynamic module.
    pub fn export_module_key(mut self, key: ModuleKey) -> Self {
        self.exports.push(ExportSpec::Module(key));
        self
    }

    /// Applies `middleware` to the routes selected by `filter`.
    pub fn middleware(mut self, middleware: impl Middleware, filter: RouteFilter) -> Self {
        self.middleware.push(MiddlewareBinding {
            middleware: Enhancer::instance(Arc::new(middleware) as Arc<dyn Middleware>),
            filter,
        });
        self
    }

    /// Applies the injectable middleware class `T` to the routes selected by `filter`.
    pub fn middleware_class<T>(mut self, filter: RouteFilter) -> Self
    where
        T: crate::Injectable + Middleware,
    {
        self.middleware.push(MiddlewareBinding {
            middleware: Enhancer::<dyn Middleware>::class::<T>(),
            filter,
        });
        self
    }

    /// Identity of this declaration.
    pub fn key(&self) -> &ModuleKey {
        &self.key
    }
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("key", &self.key)
            .field("global", &self.global)
            .field("imports", &self.imports.len())
            .field("providers", &self.providers.len())
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

/// One scanned module: its registry, imports, exports and controllers.
pub struct ModuleRef {
    pub(crate) id: ModuleId,
    pub(crate) key: ModuleKey,
    pub(crate) name: String,
    pub(crate) global: bool,
    pub(crate) registry: ProviderRegistry,
    pub(crate) imports: Vec<ModuleId>,
    pub(crate) exported_tokens: HashSet<Token>,
    pub(crate) exported_modules: Vec<ModuleId>,
    pub(crate) controllers: Vec<Token>,
    pub(crate) middleware: Vec<MiddlewareBinding>,
}

impl ModuleRef {
    pub(crate) fn new(id: ModuleId, key: ModuleKey, global: bool) -> Self {
        let name = key.name();
        Self {
            id,
            registry: ProviderRegistry::new(name.clone()),
            key,
            name,
            global,
            imports: Vec::new(),
            exported_tokens: HashSet::new(),
            exported_modules: Vec::new(),
            controllers: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Module id.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module identity.
    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for global modules.
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Providers declared by this module.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Imported modules in declaration order.
    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    /// True when `token` is listed in this module's exports.
    pub fn exports(&self, token: &Token) -> bool {
        self.exported_tokens.contains(token)
    }

    /// Controller tokens owned by this module.
    pub fn controllers(&self) -> &[Token] {
        &self.controllers
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("providers", &self.registry.len())
            .field("imports", &self.imports)
            .field("exports", &self.exported_tokens.len())
            .finish()
    }
}
