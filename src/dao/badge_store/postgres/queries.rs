/***** Users *****/

pub const CREATE_USERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Users (
    id UUID PRIMARY KEY,
    name VARCHAR(160),
    presentation_mode INTEGER,
    fit INTEGER)";

pub const UPSERT_USER: &str = "
INSERT INTO Users (id, name, presentation_mode, fit) VALUES ($1, $2, $3, $4)
ON CONFLICT (id) DO UPDATE SET
    name = EXCLUDED.name,
    presentation_mode = EXCLUDED.presentation_mode,
    fit = EXCLUDED.fit";

pub const GET_USER: &str = "SELECT id, name, presentation_mode, fit FROM Users WHERE id = $1";

pub const DELETE_USER: &str = "DELETE FROM Users WHERE id = $1";

/***** Events *****/

pub const CREATE_EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Events (
    id VARCHAR(20) PRIMARY KEY,
    name VARCHAR(160),
    timestamp TIMESTAMPTZ,
    badge_url VARCHAR(200))";

pub const CREATE_EVENTS_TIMESTAMP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS events_timestamp_idx ON Events (timestamp DESC)";

pub const HAS_EVENTS: &str = "SELECT EXISTS (SELECT 1 FROM Events)";

pub const GET_RECENT_EVENTS: &str =
    "SELECT id, name, timestamp, badge_url FROM Events ORDER BY timestamp DESC LIMIT $1";

/// Prefix of the multi-row event upsert; values and the conflict clause are appended.
pub const UPSERT_EVENTS_PREFIX: &str = "INSERT INTO Events (id, name, timestamp, badge_url) ";

pub const UPSERT_EVENTS_CONFLICT: &str = "
ON CONFLICT (id) DO UPDATE SET
    name = EXCLUDED.name,
    timestamp = EXCLUDED.timestamp,
    badge_url = EXCLUDED.badge_url";

/***** Joinings *****/

pub const CREATE_JOININGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Joinings (
    user_id UUID NOT NULL REFERENCES Users (id) ON DELETE CASCADE,
    event_id VARCHAR(20) NOT NULL REFERENCES Events (id) ON DELETE CASCADE,
    timestamp TIMESTAMPTZ,
    PRIMARY KEY (user_id, event_id))";

pub const ADD_JOINING: &str = "
INSERT INTO Joinings (user_id, event_id, timestamp) VALUES ($1, $2, NOW())
ON CONFLICT (user_id, event_id) DO NOTHING";

pub const GET_RECENT_JOININGS: &str = "
SELECT user_id, event_id, timestamp FROM Joinings
WHERE user_id = $1 ORDER BY timestamp DESC LIMIT $2";
