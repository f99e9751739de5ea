//! Prompt templates for the ranking stages.
//!
//! Templates are data with named slots (`{content}`, `{criteria}`, `{criteria_headers}`,
//! `{correction}`). Built-in defaults can be overridden per file from a directory.
//! Other braces in a template are literal, so JSON examples need no escaping.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::llm_client::prompts::EVALUATOR_SYSTEM;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read prompt template {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Prompt template '{name}' is missing required slot {{{slot}}}")]
    MissingSlot { name: &'static str, slot: &'static str },
}

/// Criteria extraction template. Slots: {content}, {correction}.
pub const CRITERIA_TEMPLATE: &str = r#"<context>
You analyse job descriptions and extract the criteria used to rank candidates for the role.
Criteria come directly from the job description and can cover skills, certifications,
experience and qualifications.

Job description:
{content}
</context>

<format>
Return valid JSON only, in exactly this shape:
{
  "criteria": [
    "Must have certification XYZ",
    "5+ years of experience in Python development",
    "Strong background in Machine Learning"
  ]
}
</format>

<rules>
- Extract only requirements stated explicitly in the job description. Do not infer.
- If a category (skills, experience, certifications, qualifications) is not mentioned, leave it out.
- Keep the list short enough to evaluate candidates against.
- For a technical role prefer technical criteria; for a non-technical role prefer non-technical ones.
- No commentary outside the JSON.
</rules>

{correction}
"#;

/// Header resolution template. Slots: {criteria}, {correction}.
pub const HEADERS_TEMPLATE: &str = r#"<context>
You write short column headers for hiring criteria that were extracted from a job description.

Criteria: {criteria}
</context>

<examples>
Technical:
- "5+ years of experience in Python development" -> "Python Experience"
- "Must have AWS cloud certification" -> "AWS Certification"
- "Experience with CI/CD pipelines" -> "CI/CD Experience"
Non-technical:
- "Strong communication skills" -> "Communication Skills"
- "Team leadership experience" -> "Team Leadership"
</examples>

<format>
Return valid JSON only, in exactly this shape:
{
  "criteria_headers": {
    "Must have certification XYZ": "Certification XYZ",
    "5+ years of experience in Python development": "Python Experience"
  }
}
</format>

<rules>
- Every criterion gets exactly one header. Do not skip any.
- Use each criterion text as the key exactly as given, character for character.
- Keep the order of the criteria as given.
- Headers use title case and are at most 3 words.
- Technical criteria get technical-sounding headers; non-technical criteria get non-technical ones.
- Each header must convey the same meaning as its criterion, and no two criteria may share a header.
- Never use "Candidate Name" or "Total Score" as a header.
</rules>

{correction}
"#;

/// Résumé scoring template. Slots: {content}, {criteria_headers}, {correction}.
pub const SCORING_TEMPLATE: &str = r#"<context>
You evaluate a candidate's résumé against hiring criteria.

Résumé:
{content}

Criteria mapped to their headers:
{criteria_headers}
</context>

<scoring_guidelines>
- 5: Exceeds requirement significantly
- 4: Fully meets requirement with additional relevant experience
- 3: Meets basic requirement
- 2: Partially meets requirement
- 1: Minimal relevant experience
- 0: No relevant experience OR no information available to assess
</scoring_guidelines>

<format>
Return valid JSON only, in exactly this shape:
{
  "Candidate Name": "Name of the candidate as written in the résumé",
  "<Header 1>": 0,
  "<Header 2>": 0
}
</format>

<rules>
- Include one key per header, spelled exactly as the header, plus "Candidate Name".
- Evaluate every criterion even if the résumé does not mention it (score 0).
- Scores are whole numbers from 0 to 5.
- Do not assume experience or skills that are not stated.
- Score partial matches proportionally to how well the requirement is met.
</rules>

{correction}
"#;

/// Full set of templates used by the ranking engine.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub system: String,
    pub criteria: String,
    pub headers: String,
    pub scoring: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: EVALUATOR_SYSTEM.to_string(),
            criteria: CRITERIA_TEMPLATE.to_string(),
            headers: HEADERS_TEMPLATE.to_string(),
            scoring: SCORING_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Loads the defaults, replacing each template whose file exists in `dir`
    /// (`system.txt`, `criteria.txt`, `headers.txt`, `scoring.txt`).
    pub fn load(dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut templates = Self::default();

        if let Some(dir) = dir {
            let slots: [(&str, &mut String); 4] = [
                ("system.txt", &mut templates.system),
                ("criteria.txt", &mut templates.criteria),
                ("headers.txt", &mut templates.headers),
                ("scoring.txt", &mut templates.scoring),
            ];
            for (file_name, target) in slots {
                let path = dir.join(file_name);
                if !path.is_file() {
                    continue;
                }
                *target = std::fs::read_to_string(&path).map_err(|source| TemplateError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                info!("Loaded prompt template override from {}", path.display());
            }
        }

        templates.check_slots()?;
        Ok(templates)
    }

    /// Verifies each template carries the slots its stage fills.
    pub fn check_slots(&self) -> Result<(), TemplateError> {
        let required: [(&'static str, &str, &[&'static str]); 3] = [
            ("criteria", &self.criteria, &["content", "correction"]),
            ("headers", &self.headers, &["criteria", "correction"]),
            (
                "scoring",
                &self.scoring,
                &["content", "criteria_headers", "correction"],
            ),
        ];
        for (name, template, slots) in required {
            for &slot in slots {
                if !template.contains(&format!("{{{slot}}}")) {
                    return Err(TemplateError::MissingSlot { name, slot });
                }
            }
        }
        Ok(())
    }
}

/// Fills `{name}` slots in a single pass. Unknown `{...}` sequences are left as-is,
/// and text inserted into a slot is never re-scanned.
pub fn render(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let filled = after.find('}').and_then(|close| {
            let name = &after[..close];
            slots
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, value)| (close, *value))
        });
        match filled {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
