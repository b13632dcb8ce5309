//! The rated-movies topology.
//!
//! ```text
//!  raw-movies ──► movies-store ───────────────────────────┐
//!                                                         ▼
//!  raw-ratings ──► rating-sums-store ──► rating-averages ──► join ──► rated-movies
//! ```
//!
//! Movies are keyed by their id and materialized into a table.  Ratings are
//! folded into a running average per movie id, which is materialized into a
//! second table.  The inner join of both tables produces `"{title}={average}"`
//! for every movie that has both a catalog entry and at least one rating, and
//! re-emits whenever either side changes.

use crate::{
    circuit::{EncodedRecord, Stream, Table, Topology, TopologyBuilder},
    codec::{CodecError, Deserializer, LongSerde, Serializer, StringSerde},
    error::{StreamsError, TopologyError},
    record::RawRecord,
};
use movie_streams_types::{
    constants::{
        MOVIES_STORE_NAME, RATED_MOVIES_STORE_NAME, RATING_AVERAGES_STORE_NAME,
        RATING_SUMS_STORE_NAME,
    },
    StreamsConfig, TopicsConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A movie catalog entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: i64,
    pub title: String,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub composers: Vec<String>,
    #[serde(default)]
    pub screenwriters: Vec<String>,
    #[serde(default)]
    pub cinematographer: Option<String>,
    #[serde(default)]
    pub production_companies: Vec<String>,
}

/// Values flowing through the rated-movies topology.
#[derive(Clone, Debug, PartialEq)]
pub enum MovieValue {
    Movie(Movie),
    Rating(f64),
    Average(f64),
    RatedMovie(String),
}

pub type MovieTopology = Topology<i64, MovieValue>;
pub type MovieTopologyBuilder = TopologyBuilder<i64, MovieValue>;

/// Decodes raw movie records.
///
/// This is the capability the topology is configured with at construction
/// time; swap it to change the movie encoding without touching the graph.
pub trait MovieCodec: Send + Sync {
    fn decode(&self, topic: &str, bytes: &[u8]) -> Result<Movie, CodecError>;
}

/// `::`-separated movie lines:
///
/// ```text
/// id::title::year::country::rating::genres::actors::directors::composers::screenwriters::cinematographer::production_companies
/// ```
///
/// Multi-valued fields are `|`-separated.  Only `id` and `title` are
/// required; trailing fields may be omitted and empty fields are treated as
/// absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMovieCodec;

impl MovieCodec for TextMovieCodec {
    fn decode(&self, topic: &str, bytes: &[u8]) -> Result<Movie, CodecError> {
        let line = StringSerde.deserialize(topic, bytes)?;
        let fields: Vec<&str> = line.trim().split("::").map(str::trim).collect();

        let field = |i: usize| fields.get(i).copied().filter(|f| !f.is_empty());
        let list = |i: usize| -> Vec<String> {
            field(i)
                .map(|f| {
                    f.split('|')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let movie_id = field(0)
            .ok_or_else(|| CodecError::malformed(topic, "empty movie line"))?
            .parse::<i64>()
            .map_err(|e| CodecError::malformed(topic, format!("invalid movie id: {e}")))?;
        let title = field(1)
            .ok_or_else(|| CodecError::malformed(topic, format!("movie {movie_id} has no title")))?
            .to_string();
        let release_year = field(2)
            .map(|y| y.parse::<i32>())
            .transpose()
            .map_err(|e| CodecError::malformed(topic, format!("invalid release year: {e}")))?;
        let rating = field(4)
            .map(|r| r.parse::<f64>())
            .transpose()
            .map_err(|e| CodecError::malformed(topic, format!("invalid movie rating: {e}")))?;

        Ok(Movie {
            movie_id,
            title,
            release_year,
            country: field(3).map(str::to_string),
            rating,
            genres: list(5),
            actors: list(6),
            directors: list(7),
            composers: list(8),
            screenwriters: list(9),
            cinematographer: field(10).map(str::to_string),
            production_companies: list(11),
        })
    }
}

/// Movies encoded as JSON objects with the fields of [`Movie`].
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMovieCodec;

impl MovieCodec for JsonMovieCodec {
    fn decode(&self, topic: &str, bytes: &[u8]) -> Result<Movie, CodecError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(topic, format!("invalid movie JSON: {e}")))
    }
}

/// Parse a raw rating record.
///
/// The value is either `movie_id,rating`, or just `rating` when the record
/// is keyed by movie id.
pub fn parse_rating(record: &RawRecord) -> Result<(i64, f64), StreamsError> {
    let line = StringSerde.deserialize(&record.topic, &record.value)?;
    let line = line.trim();

    let (movie_id, rating) = match line.split_once(',') {
        Some((movie_id, rating)) => {
            let movie_id = movie_id.trim().parse::<i64>().map_err(|e| {
                StreamsError::input(format!("invalid movie id '{}': {e}", movie_id.trim()))
            })?;
            (movie_id, rating.trim())
        }
        None => {
            let key = record.key.as_deref().ok_or_else(|| {
                CodecError::malformed(&record.topic, "rating has neither a key nor a movie id")
            })?;
            (LongSerde.deserialize(&record.topic, key)?, line)
        }
    };

    let rating = rating
        .parse::<f64>()
        .map_err(|e| StreamsError::input(format!("invalid rating '{rating}': {e}")))?;
    Ok((movie_id, rating))
}

/// Display string of a rated movie: the title and the average rating with
/// one decimal digit.
pub fn rated_movie(title: &str, average: f64) -> String {
    format!("{title}={average:.1}")
}

/// Table of movies keyed by movie id.
///
/// The raw record key is ignored; the key is the id parsed from the value.
pub fn movies_table(
    builder: &mut MovieTopologyBuilder,
    topics: &TopicsConfig,
    codec: Arc<dyn MovieCodec>,
) -> Result<Table, TopologyError> {
    let movies = builder.source(&topics.raw_movies, move |record: &RawRecord| {
        let movie = codec.decode(&record.topic, &record.value)?;
        Ok((movie.movie_id, MovieValue::Movie(movie)))
    })?;
    builder.to_table(movies, MOVIES_STORE_NAME)
}

/// Stream of ratings keyed by movie id.
pub fn raw_ratings_stream(
    builder: &mut MovieTopologyBuilder,
    topics: &TopicsConfig,
) -> Result<Stream, TopologyError> {
    builder.source(&topics.raw_ratings, |record: &RawRecord| {
        let (movie_id, rating) = parse_rating(record)?;
        Ok((movie_id, MovieValue::Rating(rating)))
    })
}

/// Table of average ratings keyed by movie id.
pub fn rating_average_table(
    builder: &mut MovieTopologyBuilder,
    ratings: Stream,
) -> Result<Table, TopologyError> {
    let averages = builder.average(
        ratings,
        RATING_SUMS_STORE_NAME,
        |value: &MovieValue| match value {
            MovieValue::Rating(rating) => Ok(*rating),
            other => Err(StreamsError::unexpected_value(
                RATING_SUMS_STORE_NAME,
                format!("expected a rating, found {other:?}"),
            )),
        },
        MovieValue::Average,
    )?;
    builder.to_table(averages, RATING_AVERAGES_STORE_NAME)
}

/// Join of movies and their average rating.
pub fn rated_movies_table(
    builder: &mut MovieTopologyBuilder,
    movies: Table,
    averages: Table,
) -> Result<Table, TopologyError> {
    builder.join(
        movies,
        averages,
        RATED_MOVIES_STORE_NAME,
        |_movie_id, movie, average| match (movie, average) {
            (MovieValue::Movie(movie), MovieValue::Average(average)) => {
                Ok(MovieValue::RatedMovie(rated_movie(&movie.title, *average)))
            }
            other => Err(StreamsError::unexpected_value(
                RATED_MOVIES_STORE_NAME,
                format!("expected a movie and an average, found {other:?}"),
            )),
        },
    )
}

fn encode_rated_movie(
    topic: &str,
    movie_id: &i64,
    value: &MovieValue,
) -> Result<EncodedRecord, StreamsError> {
    match value {
        MovieValue::RatedMovie(rated) => Ok((
            Some(LongSerde.serialize(topic, movie_id)?),
            StringSerde.serialize(topic, rated)?,
        )),
        other => Err(StreamsError::unexpected_value(
            topic,
            format!("expected a rated movie, found {other:?}"),
        )),
    }
}

/// Build the complete rated-movies topology.
pub fn build_rated_movies_topology(
    config: &StreamsConfig,
    codec: Arc<dyn MovieCodec>,
) -> Result<MovieTopology, StreamsError> {
    config.validate()?;

    let topics = &config.topics;
    let mut builder = MovieTopologyBuilder::new();

    let movies = movies_table(&mut builder, topics, codec)?;
    let ratings = raw_ratings_stream(&mut builder, topics)?;
    let averages = rating_average_table(&mut builder, ratings)?;
    let rated_movies = rated_movies_table(&mut builder, movies, averages)?;
    builder.sink(rated_movies, &topics.rated_movies, encode_rated_movie)?;

    Ok(builder.build()?)
}

#[cfg(test)]
mod test {
    use super::{
        parse_rating, rated_movie, JsonMovieCodec, Movie, MovieCodec, TextMovieCodec,
    };
    use crate::{
        codec::{CodecError, LongSerde, Serializer},
        record::RawRecord,
    };
    use pretty_assertions::assert_eq;

    const LETHAL_WEAPON: &str = "1::Lethal Weapon::1987::English::7.6::Action|Crime|Thriller::Mel Gibson|Danny Glover|Gary Busey|Mitchell Ryan::Richard Donner::Michael Kamen|Eric Clapton|David Sanborn::Shane Black::Stephen Goldblatt::Warner Bros.";

    fn rating(key: Option<i64>, value: &str) -> RawRecord {
        RawRecord::new(
            "raw-ratings",
            key.map(|k| LongSerde.serialize("raw-ratings", &k).unwrap()),
            value.as_bytes().to_vec(),
        )
    }

    #[test]
    fn text_movie() {
        let movie = TextMovieCodec
            .decode("raw-movies", LETHAL_WEAPON.as_bytes())
            .unwrap();

        assert_eq!(movie.movie_id, 1);
        assert_eq!(movie.title, "Lethal Weapon");
        assert_eq!(movie.release_year, Some(1987));
        assert_eq!(movie.country.as_deref(), Some("English"));
        assert_eq!(movie.rating, Some(7.6));
        assert_eq!(movie.genres, vec!["Action", "Crime", "Thriller"]);
        assert_eq!(movie.actors.len(), 4);
        assert_eq!(movie.directors, vec!["Richard Donner"]);
        assert_eq!(movie.cinematographer.as_deref(), Some("Stephen Goldblatt"));
        assert_eq!(movie.production_companies, vec!["Warner Bros."]);
    }

    #[test]
    fn short_text_movie() {
        let movie = TextMovieCodec.decode("m", b"2::Die Hard").unwrap();
        assert_eq!(
            movie,
            Movie {
                movie_id: 2,
                title: "Die Hard".to_string(),
                ..Movie::default()
            }
        );
    }

    #[test]
    fn malformed_text_movie() {
        for line in ["", "x::Title", "3", "3::", "3::T::nineteen"] {
            let err = TextMovieCodec.decode("m", line.as_bytes()).unwrap_err();
            assert!(matches!(err, CodecError::Malformed { .. }), "{line}: {err}");
        }
    }

    #[test]
    fn json_movie() {
        let movie = JsonMovieCodec
            .decode("m", br#"{"movie_id": 5, "title": "Heat", "genres": ["Crime"]}"#)
            .unwrap();
        assert_eq!(movie.movie_id, 5);
        assert_eq!(movie.genres, vec!["Crime"]);
        assert!(JsonMovieCodec.decode("m", b"{").is_err());
    }

    #[test]
    fn ratings() {
        assert_eq!(parse_rating(&rating(None, "1,9")).unwrap(), (1, 9.0));
        assert_eq!(parse_rating(&rating(None, " 4 , 7.5 ")).unwrap(), (4, 7.5));
        assert_eq!(parse_rating(&rating(Some(3), "8")).unwrap(), (3, 8.0));
        // The movie id in the value wins over the key.
        assert_eq!(parse_rating(&rating(Some(3), "2,8")).unwrap(), (2, 8.0));
    }

    #[test]
    fn bad_ratings() {
        let code = |value: &str, key: Option<i64>| {
            parse_rating(&rating(key, value))
                .unwrap_err()
                .error_code()
                .into_owned()
        };
        assert_eq!(code("1,great", None), "InvalidInput");
        assert_eq!(code("one,9", None), "InvalidInput");
        assert_eq!(code("great", Some(1)), "InvalidInput");
        assert_eq!(code("9", None), "CodecError");
    }

    #[test]
    fn formatting() {
        assert_eq!(rated_movie("Lethal Weapon", 9.0), "Lethal Weapon=9.0");
        assert_eq!(rated_movie("Heat", 25.0 / 3.0), "Heat=8.3");
    }
}
