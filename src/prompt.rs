//! Prompt text and directive assembly.
//!
//! Everything the LLM is ever told lives here: the agent system prefix, the
//! per-strategy SQL search directives, the normalizer instruction, and the
//! pure function that folds chat history and the current query into a single
//! directive string. Assembly is deterministic — same history and query,
//! byte-identical output — and applies no truncation or token budgeting, so
//! the directive grows without bound with turn length. That is a known,
//! deliberate limitation.

use crate::history::ChatTurn;

/// System prefix for the delegated query agent.
///
/// Advisory instructions only; the enforced safety boundary is the agent's
/// read-only database handle (see [`crate::db::connect_read_only`]).
pub const AGENT_SYSTEM_PREFIX: &str = "\
You are an intelligent Text-to-SQL + Knowledge agent for a personal care products company.
You have access to a database that stores structured product information like name, category, price, and availability.

Your job is to:
1. Convert product-related questions into accurate SQL queries and present clear, human-like answers.
2. If the product or requested data is NOT found in the database, you must switch to your general world knowledge to answer naturally - do NOT say that you lack information or cannot answer.
3. For example, if a user asks about the benefits, uses, or effects of a product that is not present in the database, give a helpful and factual general response based on your own knowledge.
4. Only use the database for factual, structured data (like price, category, stock availability, etc.).
5. When switching to general knowledge mode, never generate SQL queries.
6. Always be polite, conversational, and confident in your answers.
7. Limit database query results to 10 rows maximum.
8. Never use INSERT, UPDATE, DELETE, or DROP commands.
";

/// Escalation rule appended to the agent prefix. Queries about defects,
/// returns, complaints, or reaching a human get this fixed answer verbatim.
pub const SUPPORT_ESCALATION_RULE: &str = "\
IF the user query is about a product being defective, a product return, raising a complaint,
or talking to a human representative/customer support,
you MUST immediately stop all other actions and answer with this EXACT phrase:
\"For immediate assistance with defective products, returns, complaints, or to speak to a human representative, please call our dedicated customer support line at +91-9999333943. Please have your order number ready.\"
";

/// Output protocol for the planning call. The model replies with exactly one
/// of the two forms; anything that is not SQL is treated as a direct answer.
pub const PLANNER_OUTPUT_RULE: &str = "\
Reply with exactly ONE of the following:
- A line starting with 'SQL:' followed by a single SELECT statement, when the database should be consulted.
- A line starting with 'ANSWER:' followed by your complete answer, when answering from general knowledge.
Do not add any other text before or after.
";

const SEARCH_DIRECTIVE_EXACT: &str = "\
SQL Construction Rule:
Match product names with exact equality (=) on the product_name column.
";

const SEARCH_DIRECTIVE_FUZZY: &str = "\
SQL Construction Rule:
For product names that contain many words, commas, or special characters,
DO NOT use an exact match (=). Instead, use the SQL 'LIKE' operator with wildcards ('%'),
case-insensitively, and select only the most unique 3-5 words from the name to find the product.
For example, for a product named 'XYZ A, B, C, D', query:
WHERE product_name LIKE '%XYZ A%' AND product_name LIKE '%D%'.
Combine multiple keywords with OR when the user's wording is ambiguous.
This prevents errors from incorrect escaping or punctuation.
";

const SEARCH_DIRECTIVE_TWO_STEP: &str = "\
SQL Construction Rule:
First try a case-insensitive LIKE match using the most unique 3-5 words of the product name.
If that returns no rows, retry with a single broadest keyword before falling back to general knowledge.
";

/// How the agent is told to match product names in generated SQL.
///
/// The original service iterated on this rule across near-duplicate prompt
/// files; here each variant is a named constant selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Exact,
    Fuzzy,
    TwoStep,
}

impl SearchStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            "two-step" => Some(Self::TwoStep),
            _ => None,
        }
    }

    /// The static SQL-search directive for this strategy.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Exact => SEARCH_DIRECTIVE_EXACT,
            Self::Fuzzy => SEARCH_DIRECTIVE_FUZZY,
            Self::TwoStep => SEARCH_DIRECTIVE_TWO_STEP,
        }
    }
}

/// Fold prior turns and the current query into the directive string.
///
/// Layout, in order: fixed preamble, each prior turn as a
/// `User:`/`Assistant:` line pair in chronological order, a blank line, the
/// current query line.
pub fn assemble_directive(history: &[ChatTurn], user_query: &str) -> String {
    let mut chat_context = String::new();
    for turn in history {
        chat_context.push_str(&format!(
            "User: {}\nAssistant: {}\n",
            turn.user_message, turn.ai_response
        ));
    }

    format!(
        "Below is the chat history between the user and the assistant.\n\
         Use it as context to answer the next question naturally and accurately.\n\n\
         {}\n\
         Current User Query: {}\n",
        chat_context, user_query
    )
}

/// Full prompt for the agent's planning call: prefix, strategy directive,
/// escalation rule, catalog schema, output protocol, then the directive.
pub fn build_planner_prompt(strategy: SearchStrategy, schema: &str, directive: &str) -> String {
    format!(
        "{}\n{}\n{}\nAvailable table:\n{}\n\n{}\n{}",
        AGENT_SYSTEM_PREFIX,
        strategy.directive(),
        SUPPORT_ESCALATION_RULE,
        schema,
        PLANNER_OUTPUT_RULE,
        directive
    )
}

/// Prompt for composing an answer from query results.
pub fn build_composer_prompt(directive: &str, sql: &str, rows_json: &str) -> String {
    format!(
        "{}\n{}\nThe following SQL query was executed against the product database:\n{}\n\n\
         It returned these rows as JSON:\n{}\n\n\
         Using only this data, write a clear, human-like answer to the user's current query.",
        AGENT_SYSTEM_PREFIX, directive, sql, rows_json
    )
}

/// Prompt for the general-knowledge fallback when a query matched no rows.
pub fn build_fallback_prompt(directive: &str) -> String {
    format!(
        "{}\n{}\nThe product database returned no matching rows for this query.\n\
         Answer from your general world knowledge instead. Do NOT say that you lack information.",
        AGENT_SYSTEM_PREFIX, directive
    )
}

/// Fixed instruction for the answer normalizer (the second LLM call).
pub const NORMALIZER_INSTRUCTION: &str = "\
You are a helpful and detailed conversational assistant. I will provide you with a User Query and a Raw LLM Response. \
Your task is to fully synthesize a complete, detailed, and polite final response that directly answers the User Query. \
Use the Raw LLM Response as your primary source of fact, but expand upon it using clear, easy-to-understand language. \
Your final output must be completely clean, meaning you must remove all internal agent tags, errors, conversational preambles, and any unwanted symbols like **, *, or #. \
The final response should be a complete sentence or paragraph, grammatically correct, and highly readable.";

/// Prompt for the normalization call.
pub fn build_normalizer_prompt(user_query: &str, raw_output: &str) -> String {
    format!(
        "User Query: {}\n\nResponse: {}\n\n{}",
        user_query, raw_output, NORMALIZER_INSTRUCTION
    )
}
