pub use libnano::glob_match;
