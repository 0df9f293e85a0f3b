//! Prompt builders for the gated AI features.
//!
//! Each prompt instructs the model to answer in a fixed JSON shape; the
//! dispatcher extracts the first balanced JSON span from whatever prose the
//! model wraps around it, so the schemas here are a request, not a contract.

pub fn career_analysis(career_path: &str) -> String {
    format!(
        r#"You are a career advisor specializing in the tech market. Provide detailed, actionable career analysis with current market insights.

Analyze the career path: {career_path}

Provide a comprehensive analysis in JSON format:
{{
  "career": "{career_path}",
  "summary": "2-3 sentence overview of this career",
  "confidenceScore": 85,
  "salaryRange": {{"entry": "range", "mid": "range", "senior": "range"}},
  "risk": "Low/Medium/High",
  "alternatives": ["Alternative Career 1", "Alternative Career 2", "Alternative Career 3"],
  "requiredSkills": ["Skill 1", "Skill 2", "Skill 3", "Skill 4", "Skill 5"],
  "growthOutlook": "Description of 5-year growth potential",
  "topCompanies": ["Company 1", "Company 2", "Company 3"],
  "demandTrend": "Increasing/Stable/Decreasing",
  "learningPath": "Recommended learning approach"
}}"#
    )
}

pub fn project_ideas(topic: &str, category: Option<&str>) -> String {
    let category_line = match category {
        Some(category) => format!("Category focus: {category}\n"),
        None => String::new(),
    };
    format!(
        r#"You are a mentor generating practical portfolio project ideas for developers.

Generate 6-10 project ideas for the topic: {topic}
{category_line}
Return JSON in this exact format:
{{
  "projects": [
    {{
      "title": "Project title",
      "description": "What the project does and why it is worth building",
      "difficulty": "Beginner/Medium/Advanced",
      "technologies": ["Tech 1", "Tech 2"],
      "features": ["Feature 1", "Feature 2", "Feature 3"],
      "learningOutcomes": ["Outcome 1", "Outcome 2"]
    }}
  ]
}}

Mix difficulties from beginner to advanced and keep ideas concrete enough to start this week."#
    )
}

pub fn job_search(role: &str, skills: &[String], location: Option<&str>) -> String {
    let skills_line = if skills.is_empty() {
        String::new()
    } else {
        format!("Candidate skills: {}\n", skills.join(", "))
    };
    let location_line = match location {
        Some(location) => format!("Preferred location: {location}\n"),
        None => String::new(),
    };
    format!(
        r#"You are a job market analyst. Generate realistic current job listings for the role: {role}
{skills_line}{location_line}
Return JSON in this exact format:
{{
  "jobs": [
    {{
      "title": "Job title",
      "company": "Company name",
      "location": "City or Remote",
      "type": "Full-time/Internship/Contract",
      "salaryRange": "realistic range",
      "postedDaysAgo": 3,
      "requiredSkills": ["Skill 1", "Skill 2"],
      "linkedInUrl": "https://www.linkedin.com/jobs/search/?keywords=TITLE%20COMPANY&location=LOCATION"
    }}
  ]
}}

Include 8-12 listings: a mix of startups and established companies, a mix of
remote/hybrid/on-site, 2-3 internships, and recent postings (1-14 days ago).
URL-encode the linkedInUrl keywords and location (spaces as %20)."#
    )
}

pub fn ai_search(query: &str) -> String {
    format!(
        r#"You are an AI search engine that finds the best learning resources for developers. Generate helpful results with actual URLs to reputable sources (MDN, official docs, freeCodeCamp, YouTube, GitHub, Stack Overflow, Dev.to).

Find the best learning resources for: {query}

Return JSON in this exact format:
{{
  "results": [
    {{
      "title": "Resource Title",
      "description": "Brief description of what this resource covers",
      "url": "https://actual-url-to-resource.com",
      "type": "documentation|tutorial|video|article|code",
      "source": "Source name (e.g., MDN, React Docs, YouTube)"
    }}
  ]
}}

Return 6-10 high-quality results, prioritize free resources, and cover
beginner through advanced content."#
    )
}
