pub mod binder;
pub mod binding;
pub mod selection;
