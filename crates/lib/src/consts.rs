//! Directive keys and well-known manifest names.

/// Prefix shared by every directive key.
pub const DIRECTIVE_PREFIX: &str = "mpp-";

pub const VARS: &str = "mpp-vars";
pub const IMPORT_PIPELINE: &str = "mpp-import-pipeline";
pub const IMPORT_PIPELINES: &str = "mpp-import-pipelines";
pub const DEPSOLVE: &str = "mpp-depsolve";
pub const FORMAT_STRING: &str = "mpp-format-string";
pub const FORMAT_INT: &str = "mpp-format-int";
pub const FORMAT_JSON: &str = "mpp-format-json";
pub const EVAL: &str = "mpp-eval";
pub const JOIN: &str = "mpp-join";
pub const DEFINE_IMAGE: &str = "mpp-define-image";
pub const EMBED: &str = "mpp-embed";

/// Variable name the partition table is bound to when the directive has no `id`.
pub const DEFAULT_IMAGE_VAR: &str = "image";

/// Variable holding resolved packages, keyed by pipeline then package name.
pub const RPMS_VAR: &str = "rpms";

/// Variable holding digests of embedded content, keyed by embed id.
pub const EMBEDDED_VAR: &str = "embedded";

/// Stage type whose package list is computed by the dependency resolver.
pub const RPM_STAGE: &str = "org.osbuild.rpm";

/// Source type holding plain URL sources (version 1).
pub const FILES_SOURCE: &str = "org.osbuild.files";

/// Source type holding plain URL sources (version 2).
pub const CURL_SOURCE: &str = "org.osbuild.curl";

/// Source type holding inline base64 data (version 2).
pub const INLINE_SOURCE: &str = "org.osbuild.inline";

/// Secret provider backed by subscription entitlements.
pub const RHSM_SECRETS: &str = "org.osbuild.rhsm";

/// Sector size all partition offsets and sizes are expressed in.
pub const SECTOR_SIZE: u64 = 512;
