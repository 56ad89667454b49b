use std::env;

/// Scheduler-specific settings, loaded from `SCHEDULER_*` environment
/// variables the way `revision-server`'s binary entrypoint loads `DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub collections: Vec<String>,
    pub interval_seconds: u64,
    pub lazy_migrated_published_by_default: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            interval_seconds: 30,
            lazy_migrated_published_by_default: false,
        }
    }
}

/// Typed settings record replacing the loose settings dictionary the
/// original implementation threaded through every constructor.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub scheduler: SchedulerSettings,
    pub session_cookie: String,
    pub annonymous_user: String,
    pub reserved_query_string_params: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/revisions".to_string());

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let collections = env::var("SCHEDULER_COLLECTIONS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let interval_seconds = env::var("SCHEDULER_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let lazy_migrated_published_by_default = env::var(
            "SCHEDULER_LAZY_MIGRATED_PUBLISHED_BY_DEFAULT",
        )
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

        let session_cookie =
            env::var("SESSION_COOKIE").unwrap_or_else(|_| "session".to_string());

        let annonymous_user =
            env::var("ANNONYMOUS_USER").unwrap_or_else(|_| "anonymous".to_string());

        let reserved_query_string_params = env::var("RESERVED_QUERY_STRING_PARAMS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "page".to_string(),
                    "limit".to_string(),
                    "orderby".to_string(),
                    "direction".to_string(),
                    "addCurrent".to_string(),
                    "showHistory".to_string(),
                ]
            });

        Settings {
            database_url,
            max_connections,
            scheduler: SchedulerSettings {
                collections,
                interval_seconds,
                lazy_migrated_published_by_default,
            },
            session_cookie,
            annonymous_user,
            reserved_query_string_params,
        }
    }
}
