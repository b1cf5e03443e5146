use serde::Serialize;

/// Half-up rounding to a whole number: `floor(x + 0.5)`.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Half-up rounding to 2 decimals: `floor(100*x + 0.5) / 100`.
pub fn round_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Fine scale used on marks, report cards and dashboards.
pub fn fine_grade(score: f64) -> &'static str {
    if score >= 80.0 {
        "A"
    } else if score >= 75.0 {
        "A-"
    } else if score >= 70.0 {
        "B+"
    } else if score >= 65.0 {
        "B"
    } else if score >= 60.0 {
        "B-"
    } else if score >= 55.0 {
        "C+"
    } else if score >= 50.0 {
        "C"
    } else if score >= 45.0 {
        "C-"
    } else if score >= 40.0 {
        "D+"
    } else if score >= 35.0 {
        "D"
    } else if score >= 30.0 {
        "D-"
    } else {
        "E"
    }
}

/// Coarse scale used only by form-level reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CoarseGrade {
    A,
    B,
    C,
    D,
    F,
}

impl CoarseGrade {
    pub fn points(self) -> i64 {
        match self {
            CoarseGrade::A => 1,
            CoarseGrade::B => 2,
            CoarseGrade::C => 3,
            CoarseGrade::D => 4,
            CoarseGrade::F => 5,
        }
    }

    pub fn remark(self) -> &'static str {
        match self {
            CoarseGrade::A => "Excellent!",
            CoarseGrade::B => "Good",
            CoarseGrade::C => "Fair",
            CoarseGrade::D => "Needs Improvement",
            CoarseGrade::F => "Failed",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CoarseGrade::A => "A",
            CoarseGrade::B => "B",
            CoarseGrade::C => "C",
            CoarseGrade::D => "D",
            CoarseGrade::F => "F",
        }
    }
}

pub fn coarse_grade(score: f64) -> CoarseGrade {
    if score >= 74.5 {
        CoarseGrade::A
    } else if score >= 64.5 {
        CoarseGrade::B
    } else if score >= 44.5 {
        CoarseGrade::C
    } else if score >= 29.5 {
        CoarseGrade::D
    } else {
        CoarseGrade::F
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Division {
    I,
    II,
    III,
    IV,
    #[serde(rename = "ABS")]
    Abs,
}

/// Bands over summed coarse points: [7,18) I, [18,22) II, [22,26) III,
/// [26,34] IV, anything else ABS.
pub fn division_for_points(total_points: i64) -> Division {
    match total_points {
        7..=17 => Division::I,
        18..=21 => Division::II,
        22..=25 => Division::III,
        26..=34 => Division::IV,
        _ => Division::Abs,
    }
}

/// Maps a mean coarse point value to GPA. Only exact point values map;
/// fractional means fall through to 0.0.
pub fn points_to_gpa(mean_points: f64) -> f64 {
    if mean_points == 1.0 {
        4.0
    } else if mean_points == 2.0 {
        3.0
    } else if mean_points == 3.0 {
        2.0
    } else if mean_points == 4.0 {
        1.0
    } else {
        0.0
    }
}

/// Per-subject remark printed on the student report card.
pub fn report_card_remark(average: i64) -> &'static str {
    if average >= 70 {
        "Excellent"
    } else if average >= 60 {
        "Very Good"
    } else if average >= 50 {
        "Good"
    } else if average >= 40 {
        "Fair"
    } else if average > 0 {
        "Needs Improvement"
    } else {
        "N/A"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fine_scale_boundaries() {
        assert_eq!(fine_grade(80.0), "A");
        assert_eq!(fine_grade(79.0), "A-");
        assert_eq!(fine_grade(75.0), "A-");
        assert_eq!(fine_grade(70.0), "B+");
        assert_eq!(fine_grade(64.9), "B-");
        assert_eq!(fine_grade(50.0), "C");
        assert_eq!(fine_grade(30.0), "D-");
        assert_eq!(fine_grade(29.0), "E");
        assert_eq!(fine_grade(0.0), "E");
    }

    #[test]
    fn coarse_scale_boundaries_and_points() {
        assert_eq!(coarse_grade(64.5), CoarseGrade::B);
        assert_eq!(coarse_grade(64.5).points(), 2);
        assert_eq!(coarse_grade(64.4), CoarseGrade::C);
        assert_eq!(coarse_grade(64.4).points(), 3);
        assert_eq!(coarse_grade(74.5), CoarseGrade::A);
        assert_eq!(coarse_grade(29.5), CoarseGrade::D);
        assert_eq!(coarse_grade(29.4), CoarseGrade::F);
        assert_eq!(coarse_grade(29.4).remark(), "Failed");
        assert_eq!(coarse_grade(90.0).remark(), "Excellent!");
    }

    #[test]
    fn scales_stay_independent() {
        // 74.6 is an A on the coarse scale but only A- on the fine one.
        assert_eq!(coarse_grade(74.6).as_str(), "A");
        assert_eq!(fine_grade(74.6), "B+");
    }

    #[test]
    fn division_bands() {
        assert_eq!(division_for_points(12), Division::I);
        assert_eq!(division_for_points(20), Division::II);
        assert_eq!(division_for_points(24), Division::III);
        assert_eq!(division_for_points(30), Division::IV);
        assert_eq!(division_for_points(34), Division::IV);
        assert_eq!(division_for_points(6), Division::Abs);
        assert_eq!(division_for_points(35), Division::Abs);
        assert_eq!(division_for_points(2), Division::Abs);
        assert_eq!(division_for_points(7), Division::I);
        assert_eq!(division_for_points(18), Division::II);
        assert_eq!(division_for_points(22), Division::III);
        assert_eq!(division_for_points(26), Division::IV);
    }

    #[test]
    fn gpa_only_maps_whole_points() {
        assert_eq!(points_to_gpa(1.0), 4.0);
        assert_eq!(points_to_gpa(2.0), 3.0);
        assert_eq!(points_to_gpa(3.0), 2.0);
        assert_eq!(points_to_gpa(4.0), 1.0);
        assert_eq!(points_to_gpa(5.0), 0.0);
        assert_eq!(points_to_gpa(1.5), 0.0);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(72.5), 73);
        assert_eq!(round_half_up(72.49), 72);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_2_decimals(66.666), 66.67);
        assert_eq!(round_2_decimals(2.5), 2.5);
    }

    #[test]
    fn report_card_remarks() {
        assert_eq!(report_card_remark(70), "Excellent");
        assert_eq!(report_card_remark(65), "Very Good");
        assert_eq!(report_card_remark(50), "Good");
        assert_eq!(report_card_remark(45), "Fair");
        assert_eq!(report_card_remark(1), "Needs Improvement");
        assert_eq!(report_card_remark(0), "N/A");
    }
}
