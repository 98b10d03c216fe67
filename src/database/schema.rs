//! Table definitions and change-notification triggers.
//!
//! Every row-level change on a synced table emits one JSON message on the
//! notification channel:
//!
//! ```text
//! { "table": "...", "operation": "INSERT|UPDATE|DELETE", "id": <bigint>, "data": <object|null> }
//! ```
//!
//! Dictionaries never carry `data` (they can be large). Boost rows carry the
//! guild's post-write count so receivers never apply deltas.

pub const CREATE_GUILD_SETTINGS: &str = "
    CREATE TABLE IF NOT EXISTS guild_settings (
        guild_id BIGINT PRIMARY KEY,
        settings JSONB NOT NULL DEFAULT '{}'
    )";

pub const CREATE_USER_SETTINGS: &str = "
    CREATE TABLE IF NOT EXISTS user_settings (
        user_id BIGINT PRIMARY KEY,
        speaker INTEGER NOT NULL DEFAULT 1,
        speed   REAL    NOT NULL DEFAULT 1.0,
        pitch   REAL    NOT NULL DEFAULT 0.0
    )";

pub const CREATE_DICT: &str = "
    CREATE TABLE IF NOT EXISTS dict (
        guild_id BIGINT PRIMARY KEY,
        dict     JSONB NOT NULL DEFAULT '{}'
    )";

pub const CREATE_GUILD_BOOSTS: &str = "
    CREATE TABLE IF NOT EXISTS guild_boosts (
        id       BIGSERIAL PRIMARY KEY,
        guild_id BIGINT NOT NULL,
        user_id  BIGINT NOT NULL
    )";

pub const CREATE_GUILD_BOOSTS_GUILD_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_guild_boosts_guild_id ON guild_boosts (guild_id)";

pub const CREATE_GUILD_BOOSTS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_guild_boosts_user_id ON guild_boosts (user_id)";

/// Trigger functions and triggers. `{channel}` is replaced with the
/// notification channel name.
const NOTIFY_TRIGGERS: &str = r#"
CREATE OR REPLACE FUNCTION vox_notify_change() RETURNS TRIGGER AS $$
DECLARE
    row_data  RECORD;
    record_id BIGINT;
    payload   JSONB;
BEGIN
    IF TG_OP = 'DELETE' THEN
        row_data := OLD;
    ELSE
        row_data := NEW;
    END IF;

    CASE TG_TABLE_NAME
        WHEN 'guild_settings' THEN
            record_id := row_data.guild_id;
            payload := CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE row_data.settings END;
        WHEN 'user_settings' THEN
            record_id := row_data.user_id;
            payload := CASE WHEN TG_OP = 'DELETE' THEN NULL ELSE jsonb_build_object(
                'speaker', row_data.speaker,
                'speed', row_data.speed,
                'pitch', row_data.pitch
            ) END;
        WHEN 'dict' THEN
            record_id := row_data.guild_id;
            payload := NULL;
        WHEN 'guild_boosts' THEN
            record_id := row_data.guild_id;
            payload := jsonb_build_object(
                'count', (SELECT COUNT(*) FROM guild_boosts WHERE guild_id = row_data.guild_id)
            );
        ELSE
            RETURN NULL;
    END CASE;

    PERFORM pg_notify(
        '{channel}',
        json_build_object(
            'table', TG_TABLE_NAME,
            'operation', TG_OP,
            'id', record_id,
            'data', payload
        )::text
    );
    RETURN NULL;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS guild_settings_notify ON guild_settings;
CREATE TRIGGER guild_settings_notify
    AFTER INSERT OR UPDATE OR DELETE ON guild_settings
    FOR EACH ROW EXECUTE FUNCTION vox_notify_change();

DROP TRIGGER IF EXISTS user_settings_notify ON user_settings;
CREATE TRIGGER user_settings_notify
    AFTER INSERT OR UPDATE OR DELETE ON user_settings
    FOR EACH ROW EXECUTE FUNCTION vox_notify_change();

DROP TRIGGER IF EXISTS dict_notify ON dict;
CREATE TRIGGER dict_notify
    AFTER INSERT OR UPDATE OR DELETE ON dict
    FOR EACH ROW EXECUTE FUNCTION vox_notify_change();

DROP TRIGGER IF EXISTS guild_boosts_notify ON guild_boosts;
CREATE TRIGGER guild_boosts_notify
    AFTER INSERT OR DELETE ON guild_boosts
    FOR EACH ROW EXECUTE FUNCTION vox_notify_change();
"#;

/// Table statements in creation order.
pub const TABLES: [&str; 6] = [
    CREATE_GUILD_SETTINGS,
    CREATE_USER_SETTINGS,
    CREATE_DICT,
    CREATE_GUILD_BOOSTS,
    CREATE_GUILD_BOOSTS_GUILD_INDEX,
    CREATE_GUILD_BOOSTS_USER_INDEX,
];

/// Trigger SQL bound to `channel`.
///
/// The channel name ends up inside a string literal, so single quotes are
/// doubled.
pub fn notify_triggers(channel: &str) -> String {
    NOTIFY_TRIGGERS.replace("{channel}", &channel.replace('\'', "''"))
}
