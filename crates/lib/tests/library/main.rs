mod common;
mod depsolve_tests;
mod import_tests;
mod properties_tests;
