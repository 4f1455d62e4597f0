/// A snapshot of the identity fields the stats engine refreshes from
/// configuration (`spec.md` §3 expansion, grounded on `stats.c`'s
/// `ice_config_t` subset consumed by `stats_global`).
///
/// This is intentionally the trimmed subset the engine cares about, not the
/// whole server configuration — parsing the rest of the config language is a
/// `spec.md` Non-goal.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub server_id: String,
    pub host: String,
    pub location: String,
    pub admin: String,
    pub build: Option<String>,
}
