// Draft order generation: which players are auctioned, and in what sequence.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::player::{Player, PlayerId, Role};

// ---------------------------------------------------------------------------
// Scope and policy
// ---------------------------------------------------------------------------

/// Which part of the catalog participates in the active order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DraftScope {
    #[default]
    AllRoles,
    SingleRole(Role),
}

impl DraftScope {
    pub fn includes(&self, role: Role) -> bool {
        match self {
            DraftScope::AllRoles => true,
            DraftScope::SingleRole(r) => *r == role,
        }
    }

    /// Parse `ALL` or a role code/name.
    pub fn from_str_scope(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("ALL") {
            return Some(DraftScope::AllRoles);
        }
        Role::from_str_role(s).map(DraftScope::SingleRole)
    }
}

impl fmt::Display for DraftScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftScope::AllRoles => write!(f, "ALL"),
            DraftScope::SingleRole(role) => write!(f, "{role}"),
        }
    }
}

impl From<DraftScope> for String {
    fn from(scope: DraftScope) -> Self {
        scope.to_string()
    }
}

impl TryFrom<String> for DraftScope {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DraftScope::from_str_scope(&s).ok_or_else(|| format!("unknown draft scope `{s}`"))
    }
}

/// How the candidates of a scope are sequenced. Fixed per session and
/// re-applied on every scope change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Role groups in precedence order, names sorted within each group,
    /// optionally rotated to begin at `start_letter`.
    Alphabetical { start_letter: Option<char> },
    /// Uniform shuffle within each role group. A seed makes it reproducible.
    Random { seed: Option<u64> },
}

impl Default for OrderingPolicy {
    fn default() -> Self {
        OrderingPolicy::Alphabetical { start_letter: None }
    }
}

// ---------------------------------------------------------------------------
// DraftOrder
// ---------------------------------------------------------------------------

/// An ordered sequence of distinct player ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOrder(Vec<PlayerId>);

impl DraftOrder {
    /// Wrap a sequence of ids. Returns `None` if any id repeats.
    pub fn from_ids(ids: Vec<PlayerId>) -> Option<Self> {
        let mut seen = HashSet::with_capacity(ids.len());
        if ids.iter().all(|id| seen.insert(*id)) {
            Some(DraftOrder(ids))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<PlayerId> {
        self.0.get(index).copied()
    }

    pub fn position_of(&self, player_id: PlayerId) -> Option<usize> {
        self.0.iter().position(|&id| id == player_id)
    }

    pub fn ids(&self) -> &[PlayerId] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Produce the draft order for `candidates` under `policy`.
///
/// Candidates are grouped by role in precedence order. A single-role
/// candidate set forms one group, so the same routine serves both scopes.
pub fn generate<'a, I>(candidates: I, policy: &OrderingPolicy) -> DraftOrder
where
    I: IntoIterator<Item = &'a Player>,
{
    match policy {
        OrderingPolicy::Random { seed: Some(seed) } => {
            let mut rng = StdRng::seed_from_u64(*seed);
            generate_with_rng(candidates, policy, &mut rng)
        }
        _ => generate_with_rng(candidates, policy, &mut rand::thread_rng()),
    }
}

/// Like [`generate`], drawing shuffle randomness from `rng`. The policy's
/// seed, if any, is ignored.
pub fn generate_with_rng<'a, I, R>(candidates: I, policy: &OrderingPolicy, rng: &mut R) -> DraftOrder
where
    I: IntoIterator<Item = &'a Player>,
    R: Rng + ?Sized,
{
    let mut groups: [Vec<&Player>; 4] = Default::default();
    let mut seen = HashSet::new();
    for player in candidates {
        if seen.insert(player.id) {
            groups[player.role.precedence() as usize].push(player);
        }
    }

    let mut ids = Vec::with_capacity(seen.len());
    for mut group in groups {
        match policy {
            OrderingPolicy::Alphabetical { start_letter } => {
                group.sort_by(|a, b| compare_names(&a.name, &b.name).then(a.id.cmp(&b.id)));
                if let Some(letter) = start_letter {
                    rotate_to_letter(&mut group, *letter);
                }
            }
            OrderingPolicy::Random { .. } => {
                group.shuffle(rng);
            }
        }
        ids.extend(group.iter().map(|p| p.id));
    }

    DraftOrder(ids)
}

/// Rotate a name-sorted group so it begins at the first name whose
/// upper-cased initial is at or after `letter`. Initials compare by code
/// point without accent folding, so an accented initial sorts after `Z`.
/// Left untouched when no such name exists.
fn rotate_to_letter(group: &mut [&Player], letter: char) {
    let target: String = letter.to_uppercase().collect();
    let start = group.iter().position(|p| {
        p.name
            .chars()
            .next()
            .is_some_and(|c| c.to_uppercase().collect::<String>() >= target)
    });
    if let Some(idx) = start {
        group.rotate_left(idx);
    }
}

/// Locale-style name comparison: accents and case are ignored first, then
/// accented forms sort after plain ones, then lowercase before uppercase.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let primary = |s: &str| -> Vec<char> {
        s.chars()
            .flat_map(char::to_lowercase)
            .map(fold_char)
            .filter(|c| c.is_alphanumeric())
            .collect()
    };
    let secondary = |s: &str| -> Vec<char> { s.chars().flat_map(char::to_lowercase).collect() };

    primary(a)
        .cmp(&primary(b))
        .then_with(|| secondary(a).cmp(&secondary(b)))
        .then_with(|| {
            // Lowercase first at equal letters.
            let tertiary = |s: &str| -> Vec<bool> { s.chars().map(char::is_uppercase).collect() };
            tertiary(a).cmp(&tertiary(b))
        })
        .then_with(|| a.cmp(b))
}

/// Map accented Latin letters to their base letter. Other characters pass
/// through unchanged.
fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ç' | 'ć' | 'č' | 'ĉ' | 'ċ' => 'c',
        'Ç' | 'Ć' | 'Č' | 'Ĉ' | 'Ċ' => 'C',
        'ď' | 'đ' => 'd',
        'Ď' | 'Đ' => 'D',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'ğ' | 'ģ' => 'g',
        'Ğ' | 'Ģ' => 'G',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => 'I',
        'ł' | 'ľ' | 'ĺ' | 'ļ' => 'l',
        'Ł' | 'Ľ' | 'Ĺ' | 'Ļ' => 'L',
        'ñ' | 'ń' | 'ň' | 'ņ' => 'n',
        'Ñ' | 'Ń' | 'Ň' | 'Ņ' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => 'O',
        'ř' | 'ŕ' => 'r',
        'Ř' | 'Ŕ' => 'R',
        'ś' | 'š' | 'ş' | 'ș' => 's',
        'Ś' | 'Š' | 'Ş' | 'Ș' => 'S',
        'ť' | 'ţ' | 'ț' => 't',
        'Ť' | 'Ţ' | 'Ț' => 'T',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' | 'Ÿ' => 'Y',
        'ź' | 'ż' | 'ž' => 'z',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: PlayerId, name: &str, role: Role) -> Player {
        Player {
            id,
            name: name.to_string(),
            role,
            team: "Test FC".to_string(),
            base_value: 1,
        }
    }

    fn names(order: &DraftOrder, players: &[Player]) -> Vec<String> {
        order
            .ids()
            .iter()
            .map(|id| players.iter().find(|p| p.id == *id).unwrap().name.clone())
            .collect()
    }

    fn mixed_pool() -> Vec<Player> {
        vec![
            player(1, "Zielinski", Role::Midfielder),
            player(2, "Maignan", Role::Goalkeeper),
            player(3, "Osimhen", Role::Attacker),
            player(4, "Bastoni", Role::Defender),
            player(5, "Di Lorenzo", Role::Defender),
            player(6, "Barella", Role::Midfielder),
            player(7, "Carnesecchi", Role::Goalkeeper),
            player(8, "Lautaro", Role::Attacker),
            player(9, "Acerbi", Role::Defender),
        ]
    }

    #[test]
    fn alphabetical_groups_by_role_precedence() {
        let pool = mixed_pool();
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: None });
        assert_eq!(
            names(&order, &pool),
            vec![
                "Carnesecchi",
                "Maignan",
                "Acerbi",
                "Bastoni",
                "Di Lorenzo",
                "Barella",
                "Zielinski",
                "Lautaro",
                "Osimhen",
            ]
        );
    }

    #[test]
    fn alphabetical_is_a_permutation() {
        let pool = mixed_pool();
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('m') });
        let mut ids = order.ids().to_vec();
        ids.sort();
        assert_eq!(ids, (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn alphabetical_is_deterministic() {
        let pool = mixed_pool();
        let policy = OrderingPolicy::Alphabetical { start_letter: Some('C') };
        let first = generate(&pool, &policy);
        let mut reversed = pool.clone();
        reversed.reverse();
        let second = generate(&reversed, &policy);
        assert_eq!(first, second);
    }

    #[test]
    fn start_letter_rotates_single_group() {
        let pool = vec![
            player(1, "Dave", Role::Attacker),
            player(2, "Alice", Role::Attacker),
            player(3, "Carol", Role::Attacker),
            player(4, "Bob", Role::Attacker),
        ];
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('C') });
        assert_eq!(names(&order, &pool), vec!["Carol", "Dave", "Alice", "Bob"]);
    }

    #[test]
    fn start_letter_is_case_insensitive() {
        let pool = vec![
            player(1, "alice", Role::Attacker),
            player(2, "carol", Role::Attacker),
        ];
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('c') });
        assert_eq!(names(&order, &pool), vec!["carol", "alice"]);
    }

    #[test]
    fn start_letter_rotates_each_role_group_independently() {
        let pool = vec![
            player(1, "Audero", Role::Goalkeeper),
            player(2, "Provedel", Role::Goalkeeper),
            player(3, "Acerbi", Role::Defender),
            player(4, "Bremer", Role::Defender),
        ];
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('P') });
        // No defender reaches 'P', so that group keeps its sorted order.
        assert_eq!(names(&order, &pool), vec!["Provedel", "Audero", "Acerbi", "Bremer"]);
    }

    #[test]
    fn accents_sort_with_their_base_letter() {
        let pool = vec![
            player(1, "Zapata", Role::Attacker),
            player(2, "Éderson", Role::Attacker),
            player(3, "Dybala", Role::Attacker),
            player(4, "Frattesi", Role::Attacker),
        ];
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('E') });
        assert_eq!(names(&order, &pool), vec!["Éderson", "Frattesi", "Zapata", "Dybala"]);
    }

    #[test]
    fn rotation_compares_raw_initials() {
        // Sorting folds accents, the rotation check does not: É lies past F.
        let pool = vec![
            player(1, "Zapata", Role::Attacker),
            player(2, "Éderson", Role::Attacker),
            player(3, "Dybala", Role::Attacker),
            player(4, "Frattesi", Role::Attacker),
        ];
        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('F') });
        assert_eq!(names(&order, &pool), vec!["Éderson", "Frattesi", "Zapata", "Dybala"]);

        let order = generate(&pool, &OrderingPolicy::Alphabetical { start_letter: Some('z') });
        assert_eq!(names(&order, &pool), vec!["Éderson", "Frattesi", "Zapata", "Dybala"]);
    }

    #[test]
    fn compare_names_ignores_case_and_spacing_first() {
        assert_eq!(compare_names("de Roon", "Dembele"), Ordering::Greater);
        assert_eq!(compare_names("alpha", "Alpha"), Ordering::Less);
        assert_eq!(compare_names("Muller", "Müller"), Ordering::Less);
        assert_eq!(compare_names("same", "same"), Ordering::Equal);
    }

    #[test]
    fn random_keeps_role_partitions_in_precedence_order() {
        let pool = mixed_pool();
        let order = generate(&pool, &OrderingPolicy::Random { seed: None });
        let roles: Vec<Role> = order
            .ids()
            .iter()
            .map(|id| pool.iter().find(|p| p.id == *id).unwrap().role)
            .collect();
        let mut sorted = roles.clone();
        sorted.sort();
        assert_eq!(roles, sorted);
        assert_eq!(order.len(), pool.len());
    }

    #[test]
    fn random_with_seed_is_reproducible() {
        let pool = mixed_pool();
        let policy = OrderingPolicy::Random { seed: Some(42) };
        assert_eq!(generate(&pool, &policy), generate(&pool, &policy));
    }

    #[test]
    fn random_positions_are_roughly_uniform() {
        let pool = vec![
            player(1, "A", Role::Defender),
            player(2, "B", Role::Defender),
            player(3, "C", Role::Defender),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 6000;
        let mut first_counts = [0usize; 3];
        for _ in 0..trials {
            let order = generate_with_rng(&pool, &OrderingPolicy::Random { seed: None }, &mut rng);
            let mut ids = order.ids().to_vec();
            let first = ids[0];
            first_counts[(first - 1) as usize] += 1;
            ids.sort();
            assert_eq!(ids, vec![1, 2, 3]);
        }
        for count in first_counts {
            // Expected 2000 each; allow a wide statistical margin.
            assert!((1700..=2300).contains(&count), "skewed count {count}");
        }
    }

    #[test]
    fn empty_candidates_yield_empty_order() {
        let pool: Vec<Player> = vec![];
        assert!(generate(&pool, &OrderingPolicy::default()).is_empty());
        assert!(generate(&pool, &OrderingPolicy::Random { seed: None }).is_empty());
    }

    #[test]
    fn duplicate_candidates_are_collapsed() {
        let p = player(1, "Solo", Role::Attacker);
        let order = generate([&p, &p], &OrderingPolicy::default());
        assert_eq!(order.ids(), &[1]);
    }

    #[test]
    fn from_ids_rejects_duplicates() {
        assert!(DraftOrder::from_ids(vec![1, 2, 3]).is_some());
        assert!(DraftOrder::from_ids(vec![1, 2, 1]).is_none());
    }

    #[test]
    fn scope_parses_and_displays() {
        assert_eq!(DraftScope::from_str_scope("all"), Some(DraftScope::AllRoles));
        assert_eq!(
            DraftScope::from_str_scope("A"),
            Some(DraftScope::SingleRole(Role::Attacker))
        );
        assert_eq!(DraftScope::from_str_scope("nope"), None);
        assert_eq!(DraftScope::SingleRole(Role::Defender).to_string(), "D");
        assert_eq!(DraftScope::AllRoles.to_string(), "ALL");
    }

    #[test]
    fn scope_serializes_as_string() {
        let json = serde_json::to_string(&DraftScope::SingleRole(Role::Goalkeeper)).unwrap();
        assert_eq!(json, "\"P\"");
        let back: DraftScope = serde_json::from_str("\"ALL\"").unwrap();
        assert_eq!(back, DraftScope::AllRoles);
        assert!(serde_json::from_str::<DraftScope>("\"Q\"").is_err());
    }

    #[test]
    fn policy_serializes_with_kind_tag() {
        let json = serde_json::to_string(&OrderingPolicy::Alphabetical { start_letter: Some('C') })
            .unwrap();
        assert_eq!(json, r#"{"kind":"alphabetical","start_letter":"C"}"#);
        let back: OrderingPolicy = serde_json::from_str(r#"{"kind":"random","seed":9}"#).unwrap();
        assert_eq!(back, OrderingPolicy::Random { seed: Some(9) });
    }
}
