//! Harness scenarios: scripted headings and device motion profiles.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Stationary device, fixed heading; convergence baseline
    SteadyHeading,

    /// Stationary device turning at a constant rate; measures filter lag
    SlowTurn,

    /// Walk north past a line of geo-anchored objects; exercises the
    /// distance gate as objects enter and leave range
    CityWalk,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyHeading,
            ScenarioId::SlowTurn,
            ScenarioId::CityWalk,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyHeading => "steady_heading",
            ScenarioId::SlowTurn => "slow_turn",
            ScenarioId::CityWalk => "city_walk",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyHeading => "Fixed 60° heading, stationary device, convergence check",
            ScenarioId::SlowTurn => "3°/s turn, stationary device, filter-lag check",
            ScenarioId::CityWalk => "1.4 m/s walk north past anchored objects, gating check",
        }
    }

    /// True device heading at simulation time `t_secs`.
    pub fn true_heading_at(&self, t_secs: f64) -> f64 {
        match self {
            ScenarioId::SteadyHeading => 60.0,
            ScenarioId::SlowTurn => (3.0 * t_secs) % 360.0,
            ScenarioId::CityWalk => 0.0, // facing the walk direction
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_heading" | "steadyheading" | "steady" => Ok(ScenarioId::SteadyHeading),
            "slow_turn" | "slowturn" | "turn" => Ok(ScenarioId::SlowTurn),
            "city_walk" | "citywalk" | "walk" => Ok(ScenarioId::CityWalk),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
