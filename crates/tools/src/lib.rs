//! Built-in tools for Colloquy.
//!
//! Arithmetic over number lists, division, and vector-store search.

pub mod calculator;
pub mod vector_store;

pub use calculator::{DivideTool, ListArithmeticTool, ListOperation};
pub use vector_store::{
    InMemoryStore, PineconeStore, SearchVectorStoreTool, VectorRecord, VectorStore,
};

use colloquy_config::AppConfig;
use colloquy_core::error::ToolError;
use colloquy_core::tool::ToolRegistry;
use std::sync::Arc;

/// Register the four arithmetic tools.
pub fn register_calculator_tools(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(Box::new(ListArithmeticTool::add()))?;
    registry.register(Box::new(ListArithmeticTool::subtract()))?;
    registry.register(Box::new(ListArithmeticTool::multiply()))?;
    registry.register(Box::new(DivideTool))?;
    Ok(())
}

/// Create the registry used by a chat session.
///
/// The arithmetic tools are always present; `searchVectorStore` is added
/// only when the vector store is configured.
pub fn default_registry(config: &AppConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    register_calculator_tools(&mut registry)?;

    if let Some(store) = PineconeStore::from_config(&config.vector_store) {
        registry.register(Box::new(SearchVectorStoreTool::new(
            Arc::new(store),
            config.vector_store.top_k as usize,
        )))?;
    } else {
        tracing::debug!("Vector store not configured, searchVectorStore disabled");
    }

    Ok(registry)
}
