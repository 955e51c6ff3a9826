//! Citation-aware prompt construction for context generation.

/// Always part of the system instruction, persona or not.
pub const BASE_INSTRUCTION: &str = "You are a helpful research assistant. Answer questions based on the provided sources.
Always cite your sources using [1], [2], etc. notation when referencing specific information.
If the information is not in the sources, say so clearly.
Be concise but thorough.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagPrompt {
    pub system_instruction: String,
    pub prompt: String,
}

pub fn system_instruction(persona_instructions: Option<&str>) -> String {
    match persona_instructions.filter(|p| !p.is_empty()) {
        Some(persona) => format!("{persona}\n\n{BASE_INSTRUCTION}"),
        None => BASE_INSTRUCTION.to_string(),
    }
}

/// `[1] Source: a`, `[2] Source: b`, ... one per line, in the order given.
pub fn source_legend(source_names: &[String]) -> String {
    source_names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("[{}] Source: {}\n", i + 1, name))
        .collect()
}

pub fn assemble(
    message: &str,
    context: &str,
    source_names: &[String],
    persona_instructions: Option<&str>,
) -> RagPrompt {
    let legend = source_legend(source_names);
    let prompt = format!(
        "Sources:\n{context}\n\n{legend}\n\nUser Question: {message}\n\nProvide a well-cited response:"
    );
    RagPrompt {
        system_instruction: system_instruction(persona_instructions),
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legend_is_one_indexed_and_ordered() {
        let names = vec!["Doc 1".to_string(), "Doc 2".to_string()];
        let rag = assemble("What?", "ctx", &names, None);

        let first = rag.prompt.find("[1] Source: Doc 1").unwrap();
        let second = rag.prompt.find("[2] Source: Doc 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn legend_numbers_have_no_gaps() {
        let names: Vec<String> = ["z", "a", "m"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            source_legend(&names),
            "[1] Source: z\n[2] Source: a\n[3] Source: m\n"
        );
        assert_eq!(source_legend(&[]), "");
    }

    #[test]
    fn prompt_layout() {
        let rag = assemble("Why?", "The sky is blue.", &["Sky".to_string()], None);
        assert_eq!(
            rag.prompt,
            "Sources:\nThe sky is blue.\n\n[1] Source: Sky\n\n\nUser Question: Why?\n\nProvide a well-cited response:"
        );
    }

    #[test]
    fn persona_is_prepended_never_replacing_base() {
        let rag = assemble("q", "c", &[], Some("You are a pirate."));
        assert_eq!(
            rag.system_instruction,
            format!("You are a pirate.\n\n{BASE_INSTRUCTION}")
        );
    }

    #[test]
    fn empty_persona_is_ignored() {
        assert_eq!(system_instruction(Some("")), BASE_INSTRUCTION);
        assert_eq!(system_instruction(None), BASE_INSTRUCTION);
    }

    #[test]
    fn whitespace_persona_is_kept_verbatim() {
        assert_eq!(
            system_instruction(Some("  ")),
            format!("  \n\n{BASE_INSTRUCTION}")
        );
    }
}
