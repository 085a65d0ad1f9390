//! mpp-lib: manifest preprocessing for osbuild
//!
//! Expands `mpp-*` directives in osbuild manifests into plain JSON:
//! - `vars` / `template`: variable declaration and `$name` substitution
//! - `expr` / `eval`: the expression language and the format, eval and join directives
//! - `import`: splicing pipelines and sources from other manifests
//! - `depsolve`: package resolution into checksummed URL sources
//! - `image`: partition table synthesis for `mpp-define-image`
//! - `embed`: inline content for `mpp-embed`
//!
//! [`preprocess::Preprocessor`] runs the phases in order over a
//! [`manifest::Document`].

pub mod consts;
pub mod depsolve;
pub mod embed;
pub mod eval;
pub mod expr;
pub mod image;
pub mod import;
pub mod manifest;
pub mod platform;
pub mod preprocess;
pub mod template;
pub mod util;
pub mod value;
pub mod vars;
