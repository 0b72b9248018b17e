pub mod config;
pub mod error;
pub mod ir;
pub mod parse;
pub mod render;
pub mod transform;

/// A generated file with path and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Trait for renderers that turn a class model into files.
pub trait ModelRenderer {
    type Error: std::error::Error;
    fn render(&self, model: &ir::ClassModel) -> Result<Vec<GeneratedFile>, Self::Error>;
}
