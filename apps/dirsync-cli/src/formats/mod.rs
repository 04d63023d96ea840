//! File formats for desired state input and directory export

pub mod csv;
