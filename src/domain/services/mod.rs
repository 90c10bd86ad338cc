mod pagination;

pub use pagination::Paginator;
