// Prompt constants for résumé summarization.

/// Résumé summary prompt.
/// Replace: {untrusted}, {resume_text}
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"Summarize this résumé for job matching.

{untrusted}

BEGIN RESUME
{resume_text}
END RESUME

Return a JSON object with this EXACT schema:
{
  "skills": ["Rust", "PostgreSQL", "Kubernetes"],
  "experience": "One or two sentences on roles, domains and seniority.",
  "education": "Highest degree and field, or an empty string if none is listed.",
  "years_experience": 4.5
}

List concrete technical and domain skills only, most prominent first, at most 25.
Use null for years_experience when it cannot be inferred."#;
