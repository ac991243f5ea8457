//! Output template parsing and rendering
//!
//! An output template is literal text interleaved with `{Name}` or
//! `{Name:format}` placeholders. The built-in names are `Timestamp`, `Level`,
//! `Message`, `NewLine`, `Exception` and `Properties`; any other name is looked
//! up in the event's properties and renders as empty text when absent.
//! `{{` and `}}` produce literal braces.

use crate::error::TemplateError;
use crate::event::{render_value, LogEvent};
use crate::Level;
use chrono::format::{Item, StrftimeItems};
use std::fmt::Write as _;

/// Scanner output shared by output templates and message templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Hole {
        name: String,
        format: Option<String>,
        raw: String,
    },
}

/// Split a template into literal text and placeholders
pub(crate) fn scan(input: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut body = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(TemplateError::UnterminatedPlaceholder { position });
                }

                let (name, format) = match body.split_once(':') {
                    Some((name, format)) => (name.trim(), Some(format.to_string())),
                    None => (body.trim(), None),
                };
                // Capture hints (`@`, `$`) only change structured rendering
                let name = name.trim_start_matches(['@', '$']);
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder { position });
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Hole {
                    name: name.to_string(),
                    format,
                    raw: format!("{{{}}}", body),
                });
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(TemplateError::UnmatchedClosingBrace { position });
                }
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelFormat {
    Full,
    Upper,
    Lower,
    UpperShort,
    LowerShort,
    Numeric,
}

impl LevelFormat {
    fn parse(format: Option<&str>) -> Result<Self, TemplateError> {
        match format.map(str::trim) {
            None | Some("") => Ok(LevelFormat::Full),
            Some("u") => Ok(LevelFormat::Upper),
            Some("w") => Ok(LevelFormat::Lower),
            Some("u3") => Ok(LevelFormat::UpperShort),
            Some("w3") => Ok(LevelFormat::LowerShort),
            Some("d") => Ok(LevelFormat::Numeric),
            Some(other) => Err(TemplateError::UnknownLevelFormat(other.to_string())),
        }
    }

    fn write(self, level: Level, out: &mut String) {
        match self {
            LevelFormat::Full => out.push_str(level.name()),
            LevelFormat::Upper => out.push_str(&level.name().to_ascii_uppercase()),
            LevelFormat::Lower => out.push_str(&level.name().to_ascii_lowercase()),
            LevelFormat::UpperShort => out.push_str(level.short_name()),
            LevelFormat::LowerShort => out.push_str(&level.short_name().to_ascii_lowercase()),
            LevelFormat::Numeric => {
                let _ = write!(out, "{}", level.ordinal());
            }
        }
    }
}

const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Timestamp(String),
    Level(LevelFormat),
    Message,
    NewLine,
    Exception,
    Properties,
    Property(String),
}

/// Compiled output template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    source: String,
    tokens: Vec<Token>,
}

impl OutputTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();

        for segment in scan(source)? {
            let token = match segment {
                Segment::Literal(text) => Token::Text(text),
                Segment::Hole { name, format, .. } => match name.as_str() {
                    "Timestamp" => {
                        let format = format
                            .filter(|f| !f.is_empty())
                            .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string());
                        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
                            return Err(TemplateError::InvalidTimestampFormat(format));
                        }
                        Token::Timestamp(format)
                    }
                    "Level" => Token::Level(LevelFormat::parse(format.as_deref())?),
                    "Message" => Token::Message,
                    "NewLine" => Token::NewLine,
                    "Exception" => Token::Exception,
                    "Properties" => Token::Properties,
                    _ => Token::Property(name),
                },
            };
            tokens.push(token);
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// The template text this was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(self.source.len() + event.message_template().len());

        for token in &self.tokens {
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Timestamp(format) => {
                    let _ = write!(out, "{}", event.timestamp().format(format));
                }
                Token::Level(format) => format.write(event.level(), &mut out),
                Token::Message => out.push_str(&event.render_message()),
                Token::NewLine => out.push('\n'),
                Token::Exception => {
                    if let Some(exception) = event.exception() {
                        out.push_str(exception);
                        out.push('\n');
                    }
                }
                Token::Properties => {
                    out.push('{');
                    for (i, (key, value)) in event.properties().iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        let _ = write!(out, "{}: {}", key, render_value(value));
                    }
                    out.push('}');
                }
                Token::Property(name) => {
                    if let Some(value) = event.property(name) {
                        out.push_str(&render_value(value));
                    }
                }
            }
        }

        out
    }
}

impl Default for OutputTemplate {
    fn default() -> Self {
        Self {
            source: crate::DEFAULT_OUTPUT_TEMPLATE.to_string(),
            tokens: vec![
                Token::Text("[".to_string()),
                Token::Timestamp("%m/%d/%y %H:%M:%S".to_string()),
                Token::Text(" ".to_string()),
                Token::Level(LevelFormat::UpperShort),
                Token::Text("] ".to_string()),
                Token::Message,
                Token::NewLine,
                Token::Exception,
            ],
        }
    }
}
