//! Semantic response model: an ordered list of tokens that the
//! fragmenter flows into ≤67-byte payloads. A token is the unit that
//! must never be torn apart ("Dst 12 km" stays on one fragment); the
//! glue flag suppresses the separator so continuations like ", 24h=0.0"
//! attach directly to the previous token.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub glue: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    tokens: Vec<Token>,
}

impl Response {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Convenience constructor for single-token answers (error texts etc).
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.push(text);
        response
    }

    /// Append a token, separated from the previous one by a space.
    pub fn push(&mut self, text: impl Into<String>) -> &mut Self {
        self.tokens.push(Token {
            text: text.into(),
            glue: false,
        });
        self
    }

    /// Append a token glued to the previous one (no separator).
    pub fn push_glued(&mut self, text: impl Into<String>) -> &mut Self {
        self.tokens.push(Token {
            text: text.into(),
            glue: true,
        });
        self
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_glue() {
        let mut response = Response::new();
        response.push("Rain(mm) 1h=0.5");
        response.push_glued(", 24h=1.2");
        assert_eq!(response.tokens().len(), 2);
        assert!(!response.tokens()[0].glue);
        assert!(response.tokens()[1].glue);
    }
}
