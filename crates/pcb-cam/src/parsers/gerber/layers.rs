/// What role a fabrication file plays in a board job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKind {
    CopperTop,
    CopperBottom,
    CopperInner(String),
    BoardOutline,
    Drills,
    /// Silkscreen, mask, paste and anything else not machined.
    Other,
}

impl LayerKind {
    /// Short name used for output files: `F_Cu`, `B_Cu`, `In1_Cu`, `Edge_Cuts`, `drl`.
    pub fn suffix(&self) -> String {
        match self {
            LayerKind::CopperTop => "F_Cu".into(),
            LayerKind::CopperBottom => "B_Cu".into(),
            LayerKind::CopperInner(name) => format!("{name}_Cu"),
            LayerKind::BoardOutline => "Edge_Cuts".into(),
            LayerKind::Drills => "drl".into(),
            LayerKind::Other => "other".into(),
        }
    }

    pub fn is_machined(&self) -> bool {
        !matches!(self, LayerKind::Other)
    }
}

/// Identify a layer from the arguments of an X2 `%TF.FileFunction` attribute,
/// e.g. `["Copper", "L1", "Top"]` or `["Profile", "NP"]`.
pub fn identify_from_file_function(args: &[String]) -> LayerKind {
    let Some(function) = args.first() else {
        return LayerKind::Other;
    };
    match function.as_str() {
        "Copper" => {
            let layer_num = args
                .get(1)
                .and_then(|l| l.strip_prefix('L'))
                .and_then(|n| n.parse::<u32>().ok());
            match args.get(2).map(String::as_str) {
                Some("Top") => LayerKind::CopperTop,
                Some("Bot") | Some("Bottom") => LayerKind::CopperBottom,
                Some("Inr") | Some("Inner") => match layer_num {
                    // X2 counts the top layer as L1, KiCad names the first inner layer In1
                    Some(n) if n > 1 => LayerKind::CopperInner(format!("In{}", n - 1)),
                    _ => LayerKind::CopperInner("In1".into()),
                },
                _ => LayerKind::Other,
            }
        }
        "Profile" => LayerKind::BoardOutline,
        "Plated" | "NonPlated" => LayerKind::Drills,
        _ => LayerKind::Other,
    }
}

/// Identify a layer from filename patterns.
///
/// Handles conventions from Altium/Protel, KiCad, and Eagle.
/// All comparisons are case-insensitive.
pub fn identify_from_filename(filename: &str) -> LayerKind {
    // Extract just the filename (strip directory path)
    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename);
    let lower = name.to_lowercase();

    if let Some((_, ext)) = lower.rsplit_once('.') {
        match ext {
            "drl" | "xln" | "exc" => return LayerKind::Drills,
            "gtl" | "cmp" => return LayerKind::CopperTop,
            "gbl" | "sol" => return LayerKind::CopperBottom,
            "g1" | "g2" | "g3" | "g4" | "g5" | "g6" | "g7" | "g8" => {
                return LayerKind::CopperInner(format!("In{}", &ext[1..]));
            }
            "gko" | "gm1" | "dim" => return LayerKind::BoardOutline,
            "gto" | "gbo" | "gts" | "gbs" | "gtp" | "gbp" | "plc" | "pls" | "stc" | "sts" => {
                return LayerKind::Other;
            }
            _ => {}
        }
    }

    // KiCad naming patterns
    if lower.contains("f_cu") || lower.contains("f.cu") || lower.contains("front_cu") {
        return LayerKind::CopperTop;
    }
    if lower.contains("b_cu") || lower.contains("b.cu") || lower.contains("back_cu") {
        return LayerKind::CopperBottom;
    }
    if let Some(inner) = extract_kicad_inner(&lower) {
        return LayerKind::CopperInner(inner);
    }
    if lower.contains("edge_cuts") || lower.contains("edge.cuts") || lower.contains("boardoutline")
    {
        return LayerKind::BoardOutline;
    }

    // Generic patterns
    if lower.contains("copper") {
        if lower.contains("top") {
            return LayerKind::CopperTop;
        }
        if lower.contains("bottom") {
            return LayerKind::CopperBottom;
        }
    }
    if lower.contains("outline") || lower.contains("profile") {
        return LayerKind::BoardOutline;
    }

    LayerKind::Other
}

/// Extract KiCad inner copper layer name (e.g., "In1_Cu" -> "In1").
fn extract_kicad_inner(lower: &str) -> Option<String> {
    for sep in ["_cu", ".cu"] {
        if let Some(pos) = lower.find(sep) {
            let before = &lower[..pos];
            if let Some(in_pos) = before.rfind("in") {
                if let Ok(n) = before[in_pos + 2..].parse::<u32>() {
                    return Some(format!("In{n}"));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_x2_copper() {
        assert_eq!(
            identify_from_file_function(&args(&["Copper", "L1", "Top"])),
            LayerKind::CopperTop
        );
        assert_eq!(
            identify_from_file_function(&args(&["Copper", "L4", "Bot"])),
            LayerKind::CopperBottom
        );
        assert_eq!(
            identify_from_file_function(&args(&["Copper", "L3", "Inr"])),
            LayerKind::CopperInner("In2".into())
        );
    }

    #[test]
    fn test_x2_profile_and_drill() {
        assert_eq!(
            identify_from_file_function(&args(&["Profile", "NP"])),
            LayerKind::BoardOutline
        );
        assert_eq!(
            identify_from_file_function(&args(&["Plated", "1", "2", "PTH"])),
            LayerKind::Drills
        );
        assert_eq!(
            identify_from_file_function(&args(&["Legend", "Top"])),
            LayerKind::Other
        );
        assert_eq!(identify_from_file_function(&[]), LayerKind::Other);
    }

    #[test]
    fn test_altium_extensions() {
        assert_eq!(identify_from_filename("board.GTL"), LayerKind::CopperTop);
        assert_eq!(identify_from_filename("board.GBL"), LayerKind::CopperBottom);
        assert_eq!(identify_from_filename("board.GKO"), LayerKind::BoardOutline);
        assert_eq!(identify_from_filename("board.GTO"), LayerKind::Other);
        assert_eq!(
            identify_from_filename("board.G2"),
            LayerKind::CopperInner("In2".into())
        );
    }

    #[test]
    fn test_kicad_naming() {
        assert_eq!(identify_from_filename("board-F_Cu.gbr"), LayerKind::CopperTop);
        assert_eq!(identify_from_filename("board-B_Cu.gbr"), LayerKind::CopperBottom);
        assert_eq!(
            identify_from_filename("board-Edge_Cuts.gbr"),
            LayerKind::BoardOutline
        );
        assert_eq!(
            identify_from_filename("board-In1_Cu.gbr"),
            LayerKind::CopperInner("In1".into())
        );
        assert_eq!(identify_from_filename("board-F_SilkS.gbr"), LayerKind::Other);
        assert_eq!(identify_from_filename("board.drl"), LayerKind::Drills);
    }

    #[test]
    fn test_eagle_extensions() {
        assert_eq!(identify_from_filename("board.cmp"), LayerKind::CopperTop);
        assert_eq!(identify_from_filename("board.sol"), LayerKind::CopperBottom);
        assert_eq!(identify_from_filename("board.plc"), LayerKind::Other);
    }

    #[test]
    fn test_strips_directory_path() {
        assert_eq!(
            identify_from_filename("output/copper/board-F_Cu.gbr"),
            LayerKind::CopperTop
        );
        assert_eq!(identify_from_filename("gerbers\\board.GTL"), LayerKind::CopperTop);
    }

    #[test]
    fn test_unknown_file() {
        assert_eq!(identify_from_filename("readme.txt"), LayerKind::Other);
    }

    #[test]
    fn test_suffix() {
        assert_eq!(LayerKind::CopperTop.suffix(), "F_Cu");
        assert_eq!(LayerKind::CopperInner("In2".into()).suffix(), "In2_Cu");
        assert!(LayerKind::Drills.is_machined());
        assert!(!LayerKind::Other.is_machined());
    }
}
