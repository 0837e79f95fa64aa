pub mod descriptor;
pub mod resource;
