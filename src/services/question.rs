//! Question drawing: distinct dictionary entries, one correct index, one definition each.

use rand::{Rng, seq::IndexedRandom};

use crate::dao::words::WordDictionary;

/// A question as generated for one round. Only `correct_index` stays server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub word: String,
    pub definitions: Vec<String>,
    pub correct_index: u32,
}

/// Draw a question: random category with enough entries, `options` distinct
/// entries from it, one random definition each, and a uniformly chosen answer.
///
/// Returns `None` when no category holds at least `options` entries.
pub fn draw_question<R>(dictionary: &WordDictionary, options: u32, rng: &mut R) -> Option<Question>
where
    R: Rng + ?Sized,
{
    let wanted = usize::try_from(options).ok().filter(|wanted| *wanted > 0)?;
    let eligible = dictionary
        .words_by_category()
        .values()
        .filter(|entries| entries.len() >= wanted)
        .collect::<Vec<_>>();
    let category = eligible.choose(rng)?;

    let picked = category.choose_multiple(rng, wanted).collect::<Vec<_>>();
    let definitions = picked
        .iter()
        .map(|entry| entry.definitions.choose(rng).cloned())
        .collect::<Option<Vec<_>>>()?;
    let correct = rng.random_range(0..picked.len());

    Some(Question {
        word: picked[correct].word.clone(),
        definitions,
        correct_index: correct as u32,
    })
}
