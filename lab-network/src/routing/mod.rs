pub mod derive;
pub mod facts;
pub mod route;
