mod common;
mod image_tests;
mod import_tests;
mod output_tests;
