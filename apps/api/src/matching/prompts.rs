// Prompt constants for rubric scoring.

/// System prompt for scoring. Enforces JSON-only output.
pub const SCORE_SYSTEM: &str = "You are an expert recruiter analyzing job-candidate matches. \
    Be objective and score strictly against the evidence given. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Scoring prompt.
/// Replace: {skills}, {experience}, {education}, {resume_excerpt}, {title},
///          {company}, {location}, {description}, {untrusted}
pub const SCORE_PROMPT_TEMPLATE: &str = r#"Score how well this candidate matches the job posting.

CANDIDATE SUMMARY:
Skills: {skills}
Experience: {experience}
Education: {education}

{untrusted}

BEGIN RESUME EXCERPT
{resume_excerpt}
END RESUME EXCERPT

BEGIN JOB POSTING
Title: {title}
Company: {company}
Location: {location}
Description: {description}
END JOB POSTING

Score each dimension on a 0-10 scale (decimals allowed):
- skills_match: overlap between the candidate's skills and what the job needs
- experience_match: relevance and seniority of the candidate's work history
- education_match: fit of the candidate's education for this role
- overall_fit: your holistic judgement, including anything the other dimensions miss

Return a JSON object with this EXACT schema:
{
  "skills_match": 7.5,
  "experience_match": 6,
  "education_match": 8,
  "overall_fit": 7,
  "rationale": "Two or three sentences on why this is or isn't a good match."
}"#;
