//! Prompt templates for keyword extraction and query decomposition.
//!
//! Keyword responses are caret-separated so the model never has to emit
//! structured output; a plain `a^b^c` line survives most decoding quirks.

/// Ask directly for the most relevant keywords in a query.
pub const SIMPLE_EXTRACT_KEYWORDS_PROMPT: &str = "\
Identify up to {max_keywords} keywords or entity names in the text below. \
Respond with the keywords separated by '^'. Do not provide any other text. \
If there are no suitable keywords, respond with an empty string.

<text>
{text}
</text>
";

/// Ask for keywords enriched with close variants.
pub const EXTENDED_EXTRACT_KEYWORDS_PROMPT: &str = "\
Identify up to {max_keywords} keywords or entity names in the text below, \
together with common alternative spellings and abbreviations of each. \
Respond with the keywords separated by '^'. Do not provide any other text. \
If there are no suitable keywords, respond with an empty string.

<text>
{text}
</text>
";

/// Ask for synonyms and related terms of the query's keywords.
pub const EXTRACT_SYNONYMS_PROMPT: &str = "\
For the text below, provide up to {max_keywords} synonyms or closely related \
terms for its main keywords. Respond with the terms separated by '^'. Do not \
provide any other text.

<text>
{text}
</text>
";

/// Decide whether a question bundles several independent questions.
pub const IDENTIFY_MULTIPART_QUESTION_PROMPT: &str = "\
Is the question below a single question? Answer 'yes' if it is a single \
question, or 'no' if it combines several independent questions. Do not \
provide any other text.

<question>
{question}
</question>
";

/// Split a multipart question into standalone subqueries.
pub const EXTRACT_SUBQUERIES_PROMPT: &str = "\
Break the question below into at most {max_subqueries} standalone questions, \
each answerable on its own. Respond with one question per line. Do not \
provide any other text.

<question>
{question}
</question>
";
