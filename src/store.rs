pub(crate) mod dao;
pub(crate) mod mock;
pub(crate) mod models;
