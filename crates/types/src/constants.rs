/// Input topic carrying raw movie lines.
pub const RAW_MOVIES_TOPIC_NAME: &str = "raw-movies";

/// Input topic carrying raw `movie_id,rating` lines.
pub const RAW_RATINGS_TOPIC_NAME: &str = "raw-ratings";

/// Output topic carrying `"{title}={average}"` strings keyed by movie id.
pub const RATED_MOVIES_TOPIC_NAME: &str = "rated-movies";

/// Store materializing the latest movie per id.
pub const MOVIES_STORE_NAME: &str = "movies-store";

/// Store holding the running `(count, sum)` of ratings per movie id.
pub const RATING_SUMS_STORE_NAME: &str = "rating-sums-store";

/// Store materializing the rolling average rating per movie id.
pub const RATING_AVERAGES_STORE_NAME: &str = "rating-averages-store";

/// Store materializing the joined output table.
pub const RATED_MOVIES_STORE_NAME: &str = "rated-movies-store";

pub const DEFAULT_APPLICATION_ID: &str = "kafka-films";

pub const DEFAULT_REPLICATION_FACTOR: u16 = 3;

pub const DEFAULT_STATE_DIR: &str = "/tmp/kafka-streams";
