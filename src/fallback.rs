//! Fixed documents used when a stage cannot use the model's output.
//!
//! Each is a complete, valid document of its stage's shape. The queries
//! stage has no fallback document; it returns an empty list.

use crate::protocol::{
    BorderlineExample, Keywords, Picos, Protocol, Refinements, Screening, Suggestion,
};
use std::collections::BTreeMap;

/// Human-in-the-loop checklist returned with every draft.
pub const DRAFT_CHECKLIST: &str = "# HIL Checklist (Protocol Draft)\n\n\
- [ ] Do research questions match the topic?\n\
- [ ] Inclusion criteria testable? Any vague words to replace?\n\
- [ ] Exclusion criteria complete? Add domain-specific negatives.\n\
- [ ] Years/languages/doc types OK?\n\
- [ ] Sources sufficient?\n\
- [ ] Risks acknowledged?\n\n\
Edit outputs/protocol_draft.json and re-run refine.\n";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Draft used when the draft stage falls back.
pub fn draft_protocol() -> Protocol {
    let synonyms = BTreeMap::from([(
        "domain shift".to_string(),
        strings(&["dataset shift", "external validity"]),
    )]);
    let rationales = BTreeMap::from([
        (
            "scope".to_string(),
            "Focus on robustness and domain shift.".to_string(),
        ),
        (
            "risks".to_string(),
            "Non-English coverage might be thin; RS may drift scope.".to_string(),
        ),
    ]);

    Protocol {
        research_questions: strings(&[
            "How do deep models generalize from lab to field for plant disease detection?",
        ]),
        picos: Some(Picos {
            population: Some(strings(&["crop plants"])),
            intervention: Some(strings(&["deep learning detection"])),
            comparison: Some(strings(&["lab vs field"])),
            outcomes: Some(strings(&["accuracy drop"])),
            context: Some(strings(&["field conditions"])),
        }),
        keywords: Keywords {
            include: strings(&[
                "plant disease detection",
                "domain shift",
                "field images",
                "lab-to-field",
                "generalization",
            ]),
            exclude: strings(&["yield prediction", "irrigation only"]),
            synonyms: Some(synonyms),
        },
        screening: Screening {
            inclusion_criteria: strings(&[
                "disease detection task",
                "machine/deep learning method",
                "includes field images or lab-to-field evaluation",
            ]),
            exclusion_criteria: strings(&[
                "yield-only studies",
                "pure irrigation optimization",
                "simulation-only with no field data",
            ]),
            years: (2015, 2025),
            languages: strings(&["en", "fr", "ar"]),
            doc_types: strings(&["journal", "conference", "preprint"]),
        },
        sources: strings(&["openalex", "crossref", "pubmed", "arxiv"]),
        rationales: Some(rationales),
    }
}

/// Refinements used when the refine stage falls back.
pub fn refinements() -> Refinements {
    Refinements {
        inclusion_criteria_refined: strings(&[
            "ML vision for plant disease detection",
            "has field images or lab-to-field eval",
        ]),
        exclusion_criteria_refined: strings(&["yield-only", "irrigation-only", "pure simulation"]),
        borderline_examples: vec![BorderlineExample {
            text: "Greenhouse + small field pilot".to_string(),
            suggested: Suggestion::Maybe,
            why: "pilot may qualify".to_string(),
        }],
        risks_and_ambiguities: strings(&["Remote sensing scope creep"]),
    }
}
