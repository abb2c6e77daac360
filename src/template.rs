//! Rename templates
//!
//! A template such as `Succession - S{season:02d}E{episode:02d}` is compiled
//! once into literal segments and numeric slots. The same compiled form renders
//! new names and parses numbers back out of names already at the destination,
//! so width and format handling exist in exactly one place.

use crate::error::{Result, SorterError};
use std::fmt;

/// The numeric value a template slot carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
	Season,
	Episode,
}

impl Field {
	fn from_name(name: &str) -> Option<Self> {
		match name {
			"season" => Some(Field::Season),
			"episode" => Some(Field::Episode),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	Literal(String),
	Number { field: Field, width: Option<usize> },
}

/// Numbers recovered from an existing file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
	pub season: Option<u32>,
	pub episode: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Captures {
	season: Option<u32>,
	episode: Option<u32>,
}

impl Captures {
	/// Record a value, rejecting a slot that repeats with a different number
	fn with(mut self, field: Field, value: u32) -> Option<Self> {
		let slot = match field {
			Field::Season => &mut self.season,
			Field::Episode => &mut self.episode,
		};
		match *slot {
			Some(existing) if existing != value => None,
			_ => {
				*slot = Some(value);
				Some(self)
			}
		}
	}
}

/// A compiled rename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
	source: String,
	segments: Vec<Segment>,
}

impl NameTemplate {
	/// Compile a template string.
	///
	/// Supported placeholders are `{season}` and `{episode}`, each with an
	/// optional zero-padding spec (`{episode:02d}`, `{episode:03}`). Literal
	/// braces are written `{{` and `}}`. A template must contain `{episode}`.
	pub fn compile(template: &str) -> Result<Self> {
		let mut segments = Vec::new();
		let mut literal = String::new();
		let mut chars = template.chars().peekable();

		while let Some(c) = chars.next() {
			match c {
				'{' if chars.peek() == Some(&'{') => {
					chars.next();
					literal.push('{');
				}
				'{' => {
					let mut body = String::new();
					loop {
						match chars.next() {
							Some('}') => break,
							Some(ch) => body.push(ch),
							None => {
								return Err(SorterError::invalid_template(
									template,
									"unclosed '{'",
								))
							}
						}
					}
					if !literal.is_empty() {
						segments.push(Segment::Literal(std::mem::take(&mut literal)));
					}
					segments.push(Self::parse_placeholder(template, &body)?);
				}
				'}' if chars.peek() == Some(&'}') => {
					chars.next();
					literal.push('}');
				}
				'}' => {
					return Err(SorterError::invalid_template(
						template,
						"single '}' must be escaped as '}}'",
					))
				}
				_ => literal.push(c),
			}
		}
		if !literal.is_empty() {
			segments.push(Segment::Literal(literal));
		}

		let has_episode = segments.iter().any(|s| {
			matches!(
				s,
				Segment::Number {
					field: Field::Episode,
					..
				}
			)
		});
		if !has_episode {
			return Err(SorterError::invalid_template(
				template,
				"template must contain an {episode} placeholder",
			));
		}

		Ok(Self {
			source: template.to_string(),
			segments,
		})
	}

	fn parse_placeholder(template: &str, body: &str) -> Result<Segment> {
		let (name, spec) = match body.split_once(':') {
			Some((name, spec)) => (name.trim(), Some(spec.trim())),
			None => (body.trim(), None),
		};

		let field = Field::from_name(name).ok_or_else(|| {
			SorterError::invalid_template(template, format!("unknown placeholder {{{name}}}"))
		})?;

		let width = match spec {
			None => None,
			Some(spec) => {
				let digits = spec.strip_suffix('d').unwrap_or(spec);
				if digits.is_empty() {
					None
				} else if !digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
					return Err(SorterError::invalid_template(
						template,
						format!("unsupported format spec '{spec}', expected zero padding like '02d'"),
					));
				} else {
					match digits.parse::<usize>() {
						Ok(0) => None,
						Ok(width) => Some(width),
						Err(_) => {
							return Err(SorterError::invalid_template(
								template,
								format!("padding width '{digits}' is out of range"),
							))
						}
					}
				}
			}
		};

		Ok(Segment::Number { field, width })
	}

	/// The template text as configured
	pub fn as_str(&self) -> &str {
		&self.source
	}

	/// Render a name (without extension)
	pub fn render(&self, season: u32, episode: u32) -> String {
		let mut out = String::new();
		for segment in &self.segments {
			match segment {
				Segment::Literal(text) => out.push_str(text),
				Segment::Number { field, width } => {
					let value = match field {
						Field::Season => season,
						Field::Episode => episode,
					};
					match width {
						Some(width) => out.push_str(&format!("{value:0width$}")),
						None => out.push_str(&value.to_string()),
					}
				}
			}
		}
		out
	}

	/// Parse an existing file name against the template.
	///
	/// The template has to match from the start of `name`; whatever follows must
	/// be empty or an extension starting with `.`. Slots with a width need at
	/// least that many digits, slots without one take any digit run.
	pub fn parse(&self, name: &str) -> Option<ParsedName> {
		let caps = self.match_from(0, name, Captures::default())?;
		Some(ParsedName {
			season: caps.season,
			episode: caps.episode?,
		})
	}

	fn match_from(&self, index: usize, rest: &str, caps: Captures) -> Option<Captures> {
		let Some(segment) = self.segments.get(index) else {
			return (rest.is_empty() || rest.starts_with('.')).then_some(caps);
		};

		match segment {
			Segment::Literal(text) => {
				let rest = rest.strip_prefix(text.as_str())?;
				self.match_from(index + 1, rest, caps)
			}
			Segment::Number { field, width } => {
				let available = rest.bytes().take_while(u8::is_ascii_digit).count();
				let min = width.unwrap_or(1);
				if available < min {
					return None;
				}
				// Longest run first, shorter runs let a following slot claim digits
				(min..=available).rev().find_map(|len| {
					let value = rest[..len].parse::<u32>().ok()?;
					let caps = caps.with(*field, value)?;
					self.match_from(index + 1, &rest[len..], caps)
				})
			}
		}
	}
}

impl fmt::Display for NameTemplate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.source)
	}
}
