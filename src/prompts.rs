pub const SYSTEM_TRANSLATE: &str =
    "You translate citizen complaints for a municipal triage team. Preserve meaning, \
     place names, and quantities exactly. Reply with strict JSON only.";

pub const SYSTEM_DESCRIBE: &str =
    "You describe photos attached to citizen complaints for a municipal triage team. \
     Be concrete about visible damage, hazards, and scale. 2-3 sentences, no speculation \
     beyond what the image shows.";

pub const SYSTEM_CLASSIFY: &str =
    "You score citizen complaints against a fixed severity rubric for a municipal triage \
     team. You must pick exactly one of the given levels; never invent levels.";

pub const SYSTEM_ANSWER: &str =
    "You answer questions about a filtered set of enriched citizen complaints. Ground \
     every claim in the provided records; say so plainly when the records do not contain \
     the answer.";

pub fn user_translate(title: &str, body: &str, source_language: &str, target_language: &str) -> String {
    format!(
        r#"Translate this complaint from {src} to {tgt}.

TITLE:
<{title}>

BODY:
<{body}>

Reply with strict JSON, nothing else:
{{"title": "<translated title>", "body": "<translated body>"}}"#,
        src = source_language,
        tgt = target_language,
        title = title,
        body = body
    )
}

pub fn user_describe_image(title: &str, body: Option<&str>) -> String {
    match body {
        Some(body) => format!(
            r#"The attached photo accompanies this complaint. Describe what the photo shows and how it relates to the complaint.

COMPLAINT TITLE:
<{title}>

COMPLAINT BODY:
<{body}>"#,
            title = title,
            body = body
        ),
        // No text grounding available (translation failed and the original is
        // in a language the vision model may not handle); describe image-only.
        None => "Describe what this photo of an urban issue shows: visible damage, hazards, and scale.".to_string(),
    }
}

pub fn user_classify(rubric_context: &str, title: &str, body: &str, image_descriptions: &[String]) -> String {
    let images_block = if image_descriptions.is_empty() {
        "(no images attached)".to_string()
    } else {
        image_descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("- image {}: {}", i + 1, d))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"{rubric}

COMPLAINT TITLE:
<{title}>

COMPLAINT BODY:
<{body}>

IMAGE DESCRIPTIONS:
{images}

Reply with the level number on the first line, then a short rationale.
Example:
7
Open pothole on an arterial road, unmarked; matches the Level 7 injury-risk bar."#,
        rubric = rubric_context,
        title = title,
        body = body,
        images = images_block
    )
}

pub fn user_answer(question: &str, context: &str) -> String {
    format!(
        r#"QUESTION:
<{question}>

FILTERED COMPLAINT RECORDS:
{context}

Answer the question using only these records. Cite complaint ids where useful."#,
        question = question,
        context = context
    )
}
