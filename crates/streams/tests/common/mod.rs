#![allow(dead_code)]

use movie_streams::{
    codec::{LongSerde, RecordFactory, StringSerde},
    movies::{build_rated_movies_topology, MovieValue, TextMovieCodec},
    RawRecord, StreamsConfig, Topology, TopologyTestDriver,
};
use movie_streams_types::constants::{RAW_MOVIES_TOPIC_NAME, RAW_RATINGS_TOPIC_NAME};
use std::sync::Arc;

#[path = "../../src/test.rs"]
mod logging;

pub(crate) use logging::init_test_logger;

pub const DUMMY_KAFKA: &str = "dummy.kafka.confluent.cloud:9092";
pub const DUMMY_SCHEMA_REGISTRY: &str = "https://dummy.schema-registry.confluent.cloud:8080";

pub const LETHAL_WEAPON_MOVIE: &str = "1::Lethal Weapon::1987::English::7.6::Action|Crime|Thriller::Mel Gibson|Danny Glover|Gary Busey|Mitchell Ryan::Richard Donner::Michael Kamen|Eric Clapton|David Sanborn::Shane Black::Stephen Goldblatt::Warner Bros.";
pub const LETHAL_WEAPON_RATING_9: &str = "1,9";

pub const DIE_HARD_MOVIE: &str = "2::Die Hard::1988::English::8.2::Action|Thriller::Bruce Willis|Alan Rickman::John McTiernan";

pub fn config() -> StreamsConfig {
    StreamsConfig::new(DUMMY_KAFKA, DUMMY_SCHEMA_REGISTRY)
}

pub fn topology() -> Topology<i64, MovieValue> {
    build_rated_movies_topology(&config(), Arc::new(TextMovieCodec)).unwrap()
}

pub fn driver() -> TopologyTestDriver<i64, MovieValue> {
    init_test_logger();
    TopologyTestDriver::new(topology(), config()).unwrap()
}

pub fn movies() -> RecordFactory<LongSerde, StringSerde> {
    RecordFactory::new(RAW_MOVIES_TOPIC_NAME, LongSerde, StringSerde)
}

pub fn ratings() -> RecordFactory<LongSerde, StringSerde> {
    RecordFactory::new(RAW_RATINGS_TOPIC_NAME, LongSerde, StringSerde)
}

pub fn movie(line: &str) -> RawRecord {
    movies().create(line).unwrap()
}

pub fn rating(line: &str) -> RawRecord {
    ratings().create(line).unwrap()
}
