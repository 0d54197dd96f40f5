//! C3: Embedding Index and pluggable providers.

pub mod index;
pub mod provider;

pub use index::{cosine_similarity, EmbeddingIndex};
pub use provider::{EmbeddingProvider, LocalSubprocessProvider, MockEmbeddingProvider};

#[cfg(feature = "remote-embeddings")]
pub use provider::RemoteHttpProvider;
