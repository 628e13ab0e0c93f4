//! Subject normalization, similarity and clustering.

pub mod cluster;
pub mod similarity;
pub mod subject;

pub use cluster::Clusterer;
pub use subject::normalize;
