//! Prompts for the classifier and extractor adapters.
//!
//! Callers can override either prompt via
//! [`crate::config::ExtractionConfig::classifier_prompt`] and
//! [`crate::config::ExtractionConfig::extractor_prompt`].

/// Yes/no question for the classifier.
///
/// The answer is parsed strictly (see
/// [`crate::pipeline::classify::parse_verdict`]), so the prompt insists on a
/// single word.
pub const CLASSIFIER_PROMPT: &str = "Is there a magnifier symbol in this page's margins? \
Answer with exactly one word: 'yes' or 'no'.";

/// Extraction instructions, including the JSON shape the response must have.
pub const EXTRACTOR_PROMPT: &str = r#"Extract the magnifier items from the page image, item by item.

A magnifier item is a small magnifying-glass symbol printed in the page margin,
followed by a passage of text. For every magnifier symbol, in reading order:

- cycle_id: 1 for the first magnifier on the page, 2 for the second, and so on
- page_number: the page number printed on the page (an integer, or text such as
  a roman numeral), or null if no page number is printed
- text_after_symbol: the text that follows the magnifier symbol, transcribed exactly

Respond with ONLY a JSON object of this shape, without commentary:

{"magnifier_items": [{"cycle_id": 1, "page_number": "iv", "text_after_symbol": "..."}]}

If there is no magnifier item, return {"magnifier_items": []}."#;
