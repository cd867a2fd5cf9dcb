use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
	#[error(transparent)]
	Catalog(#[from] crate8_catalog::CatalogError),

	#[error(transparent)]
	Walk(#[from] crate8_walk::WalkError),
}
