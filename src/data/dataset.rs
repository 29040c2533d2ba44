//! Duration-aware example loading.
//!
//! The upstream audio/text dataset is a collaborator behind the
//! [`AudioSource`] trait. [`FasterSpeechDataset`] joins each base example
//! with its precomputed duration record (loaded once from a JSON store) and,
//! when configured, the speaker embedding resolved through a TSV speaker
//! table. Both side tables are read-only after load and safe to share across
//! data-loading workers.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::config::DursType;
use crate::{Error, Result};

/// One example as produced by the upstream audio/text dataset.
#[derive(Debug, Clone)]
pub struct AudioExample {
    /// Stable example identifier, used to index the duration store.
    pub id: String,
    /// Waveform samples; `None` when audio loading is disabled.
    pub audio: Option<Vec<f32>>,
    /// Number of valid waveform samples.
    pub audio_len: usize,
    /// Token-id sequence.
    pub text: Vec<i64>,
    /// Number of tokens. Must equal `text.len()`.
    pub text_len: usize,
    /// Speaker identifier, if the dataset carries one.
    pub speaker: Option<String>,
}

/// The upstream audio/text dataset collaborator.
pub trait AudioSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<AudioExample>;
}

/// One fully assembled training example.
#[derive(Debug, Clone)]
pub struct Example {
    pub id: String,
    pub audio: Option<Vec<f32>>,
    pub audio_len: usize,
    pub text: Vec<i64>,
    pub text_len: usize,
    /// Durations: `text_len` entries under full-pad, `text_len + 2` under
    /// pad (the surrounding spaces carry durations too).
    pub dur: Vec<i64>,
    /// Blank-unit durations, `text_len + 1` entries. Full-pad scheme only.
    pub blank: Option<Vec<i64>>,
    /// Dense speaker index, if a speaker table is configured.
    pub speaker: Option<usize>,
    pub speaker_emb: Option<Vec<f32>>,
}

/// Pre-loaded duration annotations, keyed by example id.
///
/// The record shape depends on the duration scheme, so the scheme is resolved
/// once at load time into a tagged union rather than re-branched per access.
#[derive(Debug)]
pub enum DurationStore {
    /// One duration per space-padded token position (`tokens + 2` entries).
    Pad(HashMap<String, Vec<i64>>),
    /// (blank durations, token durations) per example; blanks have
    /// `tokens + 1` entries.
    FullPad(HashMap<String, (Vec<i64>, Vec<i64>)>),
}

impl DurationStore {
    /// Load the whole store from a JSON file. One-time blocking read.
    pub fn load(path: impl AsRef<Path>, durs_type: DursType) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let store = match durs_type {
            DursType::Pad => Self::Pad(serde_json::from_reader(reader)?),
            DursType::FullPad => Self::FullPad(serde_json::from_reader(reader)?),
        };
        tracing::info!(
            path = %path.as_ref().display(),
            examples = store.len(),
            "loaded duration store"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Pad(map) => map.len(),
            Self::FullPad(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Speaker identifier table plus per-speaker embedding vectors.
///
/// The TSV file's row order defines the dense integer id space (header row
/// skipped, first column is the identifier); the embedding file is a JSON
/// array indexed by that dense id.
#[derive(Debug)]
pub struct SpeakerTable {
    index: HashMap<String, usize>,
    embeddings: Vec<Vec<f32>>,
}

impl SpeakerTable {
    pub fn load(table_path: impl AsRef<Path>, embs_path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(table_path.as_ref())?;
        let mut index = HashMap::new();
        for (i, line) in text.lines().skip(1).enumerate() {
            let id = line.split('\t').next().unwrap_or("").to_string();
            index.insert(id, i);
        }

        let reader = BufReader::new(File::open(embs_path.as_ref())?);
        let embeddings: Vec<Vec<f32>> = serde_json::from_reader(reader)?;
        if embeddings.len() < index.len() {
            return Err(Error::Shape(format!(
                "speaker table has {} speakers but only {} embeddings",
                index.len(),
                embeddings.len()
            )));
        }

        tracing::info!(speakers = index.len(), "loaded speaker table");
        Ok(Self { index, embeddings })
    }

    pub fn n_speakers(&self) -> usize {
        self.index.len()
    }

    /// Resolve a speaker identifier to its dense id and embedding.
    pub fn resolve(&self, speaker: &str) -> Result<(usize, &[f32])> {
        let &id = self
            .index
            .get(speaker)
            .ok_or_else(|| Error::Lookup(format!("speaker {speaker:?} not in speaker table")))?;
        Ok((id, self.embeddings[id].as_slice()))
    }
}

/// Joins upstream examples with durations and speaker embeddings.
pub struct FasterSpeechDataset<S> {
    source: S,
    durs: DurationStore,
    speakers: Option<SpeakerTable>,
}

impl<S: AudioSource> FasterSpeechDataset<S> {
    pub fn new(source: S, durs: DurationStore, speakers: Option<SpeakerTable>) -> Self {
        Self {
            source,
            durs,
            speakers,
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn n_speakers(&self) -> Option<usize> {
        self.speakers.as_ref().map(SpeakerTable::n_speakers)
    }

    /// Fetch and assemble one example.
    pub fn get(&self, index: usize) -> Result<Example> {
        let base = self.source.get(index)?;
        if base.text.len() != base.text_len {
            return Err(Error::Shape(format!(
                "example {}: text has {} tokens but text_len = {}",
                base.id,
                base.text.len(),
                base.text_len
            )));
        }

        let (blank, dur) = match &self.durs {
            DurationStore::Pad(map) => {
                let dur = map
                    .get(&base.id)
                    .ok_or_else(|| Error::Lookup(format!("no durations for example {}", base.id)))?;
                // Pad-scheme records cover the space-padded sequence, so the
                // collated dur tensor lines up with the padded text.
                if dur.len() != base.text_len + 2 {
                    return Err(Error::Shape(format!(
                        "example {}: {} durations for {} space-padded tokens",
                        base.id,
                        dur.len(),
                        base.text_len + 2
                    )));
                }
                (None, dur.clone())
            }
            DurationStore::FullPad(map) => {
                let (blank, dur) = map
                    .get(&base.id)
                    .ok_or_else(|| Error::Lookup(format!("no durations for example {}", base.id)))?;
                if dur.len() != base.text_len || blank.len() != base.text_len + 1 {
                    return Err(Error::Shape(format!(
                        "example {}: {} token durations / {} blank durations for {} tokens",
                        base.id,
                        dur.len(),
                        blank.len(),
                        base.text_len
                    )));
                }
                (Some(blank.clone()), dur.clone())
            }
        };

        let (speaker, speaker_emb) = match (&self.speakers, &base.speaker) {
            (Some(table), Some(sid)) => {
                let (id, emb) = table.resolve(sid)?;
                (Some(id), Some(emb.to_vec()))
            }
            (Some(_), None) => {
                return Err(Error::Lookup(format!(
                    "example {} has no speaker id but a speaker table is configured",
                    base.id
                )))
            }
            (None, _) => (None, None),
        };

        Ok(Example {
            id: base.id,
            audio: base.audio,
            audio_len: base.audio_len,
            text: base.text,
            text_len: base.text_len,
            dur,
            blank,
            speaker,
            speaker_emb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct StubSource {
        examples: Vec<AudioExample>,
    }

    impl AudioSource for StubSource {
        fn len(&self) -> usize {
            self.examples.len()
        }

        fn get(&self, index: usize) -> Result<AudioExample> {
            Ok(self.examples[index].clone())
        }
    }

    fn stub_example(id: &str, tokens: usize, speaker: Option<&str>) -> AudioExample {
        AudioExample {
            id: id.to_string(),
            audio: Some(vec![0.0; 160]),
            audio_len: 160,
            text: (0..tokens as i64).collect(),
            text_len: tokens,
            speaker: speaker.map(str::to_string),
        }
    }

    #[test]
    fn full_pad_records_resolve_per_example() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), (vec![1i64, 0, 2, 1], vec![3i64, 4, 5]));
        let dataset = FasterSpeechDataset::new(
            StubSource {
                examples: vec![stub_example("a", 3, None)],
            },
            DurationStore::FullPad(map),
            None,
        );

        let example = dataset.get(0).unwrap();
        assert_eq!(example.dur, vec![3, 4, 5]);
        assert_eq!(example.blank.as_deref(), Some(&[1, 0, 2, 1][..]));
        assert!(example.speaker.is_none());
    }

    #[test]
    fn missing_duration_record_is_lookup_error() {
        let dataset = FasterSpeechDataset::new(
            StubSource {
                examples: vec![stub_example("missing", 3, None)],
            },
            DurationStore::Pad(HashMap::new()),
            None,
        );
        assert!(matches!(dataset.get(0), Err(Error::Lookup(_))));
    }

    #[test]
    fn duration_length_mismatch_is_shape_error() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), vec![1i64, 2]); // 2 durations for 3 tokens
        let dataset = FasterSpeechDataset::new(
            StubSource {
                examples: vec![stub_example("a", 3, None)],
            },
            DurationStore::Pad(map),
            None,
        );
        assert!(matches!(dataset.get(0), Err(Error::Shape(_))));
    }

    #[test]
    fn speaker_table_resolves_dense_ids() {
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("speakers.tsv");
        let embs_path = dir.path().join("embs.json");

        let mut table = File::create(&table_path).unwrap();
        writeln!(table, "speaker\tduration").unwrap();
        writeln!(table, "spk0\t12.5").unwrap();
        writeln!(table, "spk1\t8.25").unwrap();

        let mut embs = File::create(&embs_path).unwrap();
        write!(embs, "[[0.0, 1.0], [2.0, 3.0]]").unwrap();

        let speakers = SpeakerTable::load(&table_path, &embs_path).unwrap();
        assert_eq!(speakers.n_speakers(), 2);
        let (id, emb) = speakers.resolve("spk1").unwrap();
        assert_eq!(id, 1);
        assert_eq!(emb, &[2.0, 3.0]);
        assert!(matches!(speakers.resolve("spk9"), Err(Error::Lookup(_))));
    }

    #[test]
    fn duration_store_loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durs.json");
        std::fs::write(&path, "{\"a\": [[1, 2], [3]], \"b\": [[0, 4], [2]]}").unwrap();

        let store = DurationStore::load(&path, DursType::FullPad).unwrap();
        assert_eq!(store.len(), 2);
        match store {
            DurationStore::FullPad(map) => {
                assert_eq!(map["a"], (vec![1, 2], vec![3]));
            }
            DurationStore::Pad(_) => panic!("wrong store variant"),
        }
    }
}
