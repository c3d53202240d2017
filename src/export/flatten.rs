//! Flattening of a harvest file into CSV tables.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

use crate::harvest::{HarvestOutput, Track};
use crate::sink::JsonFileSink;

pub const TRACKS_FILE: &str = "tracks.csv";
pub const ARTISTS_FILE: &str = "artists.csv";
pub const RELATIONSHIPS_FILE: &str = "relationships.csv";

#[derive(Debug, Serialize, PartialEq)]
pub struct TrackRow<'a> {
    pub track_id: &'a str,
    pub track_name: &'a str,
    pub popularity: u8,
    pub duration_ms: u64,
    pub explicit: bool,
    pub album_name: &'a str,
    pub album_release_date: Option<&'a str>,
    pub album_type: Option<&'a str>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i32>,
    pub loudness: Option<f64>,
    pub mode: Option<i32>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i32>,
    pub artist_names: String,
}

impl<'a> From<&'a Track> for TrackRow<'a> {
    fn from(track: &'a Track) -> Self {
        let features = &track.audio_features;
        Self {
            track_id: &track.id,
            track_name: &track.name,
            popularity: track.popularity,
            duration_ms: track.duration_ms,
            explicit: track.explicit,
            album_name: &track.album.name,
            album_release_date: track.album.release_date.as_deref(),
            album_type: track.album.album_type.as_deref(),
            danceability: features.danceability,
            energy: features.energy,
            key: features.key,
            loudness: features.loudness,
            mode: features.mode,
            speechiness: features.speechiness,
            acousticness: features.acousticness,
            instrumentalness: features.instrumentalness,
            liveness: features.liveness,
            valence: features.valence,
            tempo: features.tempo,
            time_signature: features.time_signature,
            artist_names: track.artist_names().join(", "),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ArtistRow<'a> {
    pub artist_id: &'a str,
    pub artist_name: &'a str,
    pub artist_popularity: Option<u8>,
    pub artist_genres: String,
    pub enrichment_failed: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RelationshipRow<'a> {
    pub artist_id: &'a str,
    pub related_artist_id: &'a str,
}

/// Files written by one flatten.
#[derive(Debug, Clone)]
pub struct FlattenSummary {
    pub tracks_path: PathBuf,
    pub artists_path: PathBuf,
    pub relationships_path: PathBuf,
    pub tracks: usize,
    pub artists: usize,
    pub relationships: usize,
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Write the tracks, artists and relationships tables of `output` into `out_dir`.
pub fn flatten_output(output: &HarvestOutput, out_dir: &Path) -> Result<FlattenSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create export directory: {:?}", out_dir))?;

    let tracks_path = out_dir.join(TRACKS_FILE);
    let artists_path = out_dir.join(ARTISTS_FILE);
    let relationships_path = out_dir.join(RELATIONSHIPS_FILE);

    let tracks = write_rows(&tracks_path, output.tracks.iter().map(TrackRow::from))?;
    let artists = write_rows(
        &artists_path,
        output.artists.values().map(|artist| ArtistRow {
            artist_id: &artist.id,
            artist_name: &artist.name,
            artist_popularity: artist.popularity,
            artist_genres: artist
                .genres
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            enrichment_failed: artist.enrichment_failed,
        }),
    )?;
    let relationships = write_rows(
        &relationships_path,
        output
            .related_artist_edges
            .iter()
            .map(|edge| RelationshipRow {
                artist_id: &edge.artist_id,
                related_artist_id: &edge.related_artist_id,
            }),
    )?;

    info!(
        "Flattened {} tracks, {} artists, {} relationships into {:?}",
        tracks, artists, relationships, out_dir
    );

    Ok(FlattenSummary {
        tracks_path,
        artists_path,
        relationships_path,
        tracks,
        artists,
        relationships,
    })
}

/// Most recently modified `.json` file in `dir`.
pub fn latest_json(dir: &Path) -> Result<PathBuf> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
            latest = Some((modified, path));
        }
    }

    match latest {
        Some((_, path)) => Ok(path),
        None => bail!("No JSON files found in {:?}", dir),
    }
}

/// Flatten a harvest file. A directory input uses its most recent JSON file.
pub fn flatten_file(input: &Path, out_dir: &Path) -> Result<FlattenSummary> {
    let path = if input.is_dir() {
        latest_json(input)?
    } else {
        input.to_path_buf()
    };
    info!("Using input file: {:?}", path);

    let output = JsonFileSink::read_output(&path)?;
    flatten_output(&output, out_dir)
}
