//! Tessera - ORM runtime core
//!
//! Tessera turns parameterized query templates into executable statements and
//! guards the entities a transaction mutates with ordered, timeout-bounded locks.
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::{TemplateCompiler, TransactionLock, TransactionPool, memory_strategy};
//!
//! // Lock the objects this operation mutates
//! let lock = TransactionLock::new(memory_strategy(), &registry, objects, false)?;
//! TransactionPool::acquire(Duration::from_secs(5), lock)?;
//!
//! // Build the statement
//! let template = TemplateCompiler::strict().compile("update t set v=$v$ where id=$id$")?;
//! let sql = template.render_values(&values)?;
//!
//! // ... execute ...
//!
//! TransactionPool::commit_and_release()?;
//! ```
//!
//! # Architecture
//!
//! - `tessera-core`: errors, values, entity traits, lock keys, configuration
//! - `tessera-query`: template compiler, node tree, value renderers
//! - `tessera-concurrency`: lock strategies, transaction locks, the thread pool

pub use tessera_concurrency::{
    evict_stale, memory_strategy, register_strategy, strategy, unregister_strategy,
    ConnectionBundle, ConnectionOwner, LockOwner, LockRecord, LockState, LockStrategy,
    MemoryLockStrategy, PersistentLockStrategy, SqliteConnection, TransactionLock,
    TransactionPool, TransactionScope, TransactionalConnection, MEMORY_STRATEGY,
};
pub use tessera_core::{
    Entity, EntityRegistry, Error, FieldDescriptor, LockConfig, LockKey, RenderKind, Result,
    Value,
};
pub use tessera_query::{
    BinarySink, CompiledTemplate, CompilerOptions, FunctionAliases, FunctionCall,
    FunctionRewriter, Node, Parameter, RendererConfig, StandardRenderer, TemplateCompiler,
    ValueLookup, ValueRenderer,
};
