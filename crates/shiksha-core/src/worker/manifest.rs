//! Bucket names and the core asset manifest.

pub const CACHE_VERSION: &str = "v1";
pub const STATIC_CACHE: &str = "shiksha-static-v1";
pub const DYNAMIC_CACHE: &str = "shiksha-dynamic-v1";

/// Buckets that survive activation.
pub const ALLOWED_CACHES: [&str; 2] = [STATIC_CACHE, DYNAMIC_CACHE];

pub const API_PREFIX: &str = "/api/";

/// Fetched and stored on install. Any failure fails the install.
pub const CORE_ASSETS: &[&str] = &[
    "/",
    "/static/css/style.css",
    "/static/js/main.js",
    "/static/js/auth.js",
    "/static/js/db_sync.js",
    "/static/js/tf.min.js",
    "/static/js/chart.min.js",
    "/static/images/logo.png",
    "/static/locales/en.json",
    "/static/locales/hi.json",
    "/static/locales/ta.json",
    "/static/locales/od.json",
    "/manifest.json",
    "/static/ml_models/knowledge_tracer.tflite",
    "/static/ml_models/contextual_bandit.tflite",
];

const STATIC_PREFIXES: [&str; 3] = ["/static/", "/games/", "/locales/"];

pub fn is_api(path: &str) -> bool {
    path.starts_with(API_PREFIX)
}

pub fn is_core_asset(path: &str) -> bool {
    CORE_ASSETS.contains(&path)
}

/// Responses for these paths go to the static bucket; the rest to dynamic.
pub fn is_static_like(path: &str) -> bool {
    is_core_asset(path) || STATIC_PREFIXES.iter().any(|prefix| path.contains(prefix))
}

pub fn bucket_for(path: &str) -> &'static str {
    if is_static_like(path) {
        STATIC_CACHE
    } else {
        DYNAMIC_CACHE
    }
}
