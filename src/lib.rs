//! # Definition Injector - Definition-Driven Dependency Injection for Rust
//!
//! A dependency injection engine that builds services from declarative
//! definitions: constructor arguments are autowired, setup calls run in
//! order, tagged services are collected into prioritized collections, and a
//! whole container can be compiled ahead of time into a reflection-free lookup.
//!
//! ## Features
//!
//! - ⚙️ **Autowiring** - Bound arguments, injection attributes, declared types and defaults, in that order
//! - 🏷️ **Tagged collections** - Eager or lazy, ordered by priority, keyed by id or tag metadata
//! - 🔗 **References and proxies** - Alias chains with cycle detection, closures resolving on call
//! - 🔄 **Cycle detection** - Per-call construction guard; the whole cycle is reported
//! - 🏭 **Lazy singletons** - Built once on first access, safe under concurrent first access
//! - 🚀 **Compilation** - Validate everything up front and serve from a flat accessor table
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use definition_injector::prelude::*;
//!
//! struct Database {
//!     dsn: String,
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//!
//! container
//!     .register(
//!         "db",
//!         Definition::autowire(ClassDescriptor::named::<Database, _>(
//!             "Database",
//!             [ParamDescriptor::new("dsn").builtin("String")],
//!             |args| Ok(Database { dsn: args.cloned::<String>(0)? }),
//!         ))
//!         .bind("dsn", ArgumentSpec::value("postgres://localhost".to_string()))
//!         .singleton(),
//!     )
//!     .unwrap();
//!
//! container
//!     .register(
//!         "users",
//!         Definition::autowire(ClassDescriptor::named::<UserRepository, _>(
//!             "UserRepository",
//!             [ParamDescriptor::new("db").typed("db")],
//!             |args| Ok(UserRepository { db: args.get::<Database>(0)? }),
//!         )),
//!     )
//!     .unwrap();
//!
//! let users = container.get_as::<UserRepository>("users").unwrap();
//! assert_eq!(users.db.dsn, "postgres://localhost");
//!
//! // Singletons are shared, transients are rebuilt
//! let again = container.get_as::<UserRepository>("users").unwrap();
//! assert!(Arc::ptr_eq(&users.db, &again.db));
//! assert!(!Arc::ptr_eq(&users, &again));
//! ```
//!
//! ## Tagged Collections
//!
//! ```rust
//! use definition_injector::prelude::*;
//!
//! let container = Container::new();
//! container.register("low", Definition::value(1u8).tag_with("level", TagSpec::priority(1))).unwrap();
//! container.register("high", Definition::value(9u8).tag_with("level", TagSpec::priority(9))).unwrap();
//! container
//!     .register("levels", Definition::tagged(TagQuery::new("level").eager()))
//!     .unwrap();
//!
//! let levels = container.get_as::<TaggedValues>("levels").unwrap();
//! assert_eq!(levels.keys().collect::<Vec<_>>(), vec!["high", "low"]);
//! ```
//!
//! ## Compilation
//!
//! ```rust
//! use definition_injector::prelude::*;
//!
//! let container = Container::new();
//! container.register("port", Definition::value(8080u16)).unwrap();
//! container.register("http.port", Definition::reference("port")).unwrap();
//!
//! // Every definition is checked; failures name the identifier being compiled
//! let graph = container.compile().unwrap();
//! assert_eq!(graph.get("http.port").unwrap().accessor(), "get_http_port");
//!
//! let compiled = CompiledContainer::new(graph);
//! assert_eq!(*compiled.get_as::<u16>("http.port").unwrap(), 8080);
//! ```
//!
//! ## Performance
//!
//! - **Sharded maps**: `DashMap` with `ahash` for definitions, classes and singleton slots
//! - **Lock-free singleton reads**: one `OnceCell` per identifier, built once
//! - **Memoized references**: the compile pass walks each alias chain once
//! - **Compiled lookup**: no descriptor access or parameter matching after compilation

mod cache;
pub mod compiler;
mod config;
mod container;
mod context;
mod definition;
mod descriptor;
mod error;
mod instance;
mod locator;
#[cfg(feature = "logging")]
pub mod logging;
mod reference;
mod resolver;
mod storage;
mod tags;
mod value;

pub use cache::SingletonCache;
pub use compiler::{CompiledContainer, CompiledEntry, CompiledGraph, Expr, Stmt};
pub use config::ContainerConfig;
pub use container::{Container, ContainerBuilder};
pub use context::{ResolutionContext, ResolvingGuard};
pub use definition::{
    ArgKey, ArgumentSpec, BoundArguments, CallableTarget, Definition, DefinitionKind, SetupCall,
    TagPriority, TagQuery, TagSpec,
};
pub use descriptor::{
    ClassDescriptor, ClassRegistry, Constructor, FunctionBody, FunctionDescriptor, MethodBody,
    MethodDescriptor, ParamAttribute, ParamDescriptor, TypeHint,
};
pub use error::*;
pub use locator::{DiFactory, FactoryObject, ProxyClosure, ServiceLocator};
pub use reference::ReferenceResolver;
pub use storage::DefinitionStore;
pub use tags::{LazyTagged, LazyTaggedIter, TagMember, TaggedValues};
pub use value::{AnyValue, Arguments, Injectable, Instance, any_value, describe_literal, downcast_value};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ArgumentSpec, Arguments, BoundArguments, CallableTarget, ClassDescriptor, CompiledContainer,
        Container, ContainerConfig, DiError, DiFactory, Definition, FunctionDescriptor, LazyTagged,
        ParamAttribute, ParamDescriptor, ProxyClosure, Result, ServiceLocator, TagQuery, TagSpec,
        TaggedValues, args,
    };
    pub use std::sync::Arc;
}
