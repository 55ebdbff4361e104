/*!
 * Audio synthesis: content-addressed cache, backends and the annotator that
 * writes audio references into a text.
 */

pub mod annotator;
pub mod backend;
pub mod cache;
pub mod key;
pub mod wav;

pub use annotator::{AudioAnnotator, PageAudioOutcome};
pub use backend::{SpeechApiBackend, SynthesisBackend, SynthesisRequest, ToneBackend};
pub use cache::{AudioCache, AudioReference};
pub use key::{AudioKey, AudioLevel};
