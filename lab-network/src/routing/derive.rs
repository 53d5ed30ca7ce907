use crate::change::ConfigChange;
use crate::error::ConfigurationError;
use crate::routing::facts::RoutingFacts;
use crate::routing::route::Route;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;

/// The static routes of every router, keyed by router name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingPlan {
    routes: BTreeMap<String, Vec<Route>>,
}

impl RoutingPlan {
    /// Routes of a single router, sorted by destination
    pub fn routes(&self, router: &str) -> &[Route] {
        self.routes.get(router).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates over routers in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Route])> {
        self.routes
            .iter()
            .map(|(router, routes)| (router.as_str(), routes.as_slice()))
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// The changes that install the plan, router by router
    pub fn changes(&self) -> impl Iterator<Item = (&str, ConfigChange)> {
        self.iter().flat_map(|(router, routes)| {
            routes
                .iter()
                .map(move |route| (router, ConfigChange::AddRoute(*route)))
        })
    }
}

/// Computes the static routes each router needs to reach every host-facing subnet
///
/// For router `R` and a host-facing subnet `H` served by another router, the route points at the
/// first router on a shortest path (in router hops) from `R` to `H`'s owner. Neighbors are explored
/// in name order, so ties between equal-cost paths always resolve the same way.
pub fn derive_routes(facts: &RoutingFacts) -> Result<RoutingPlan, ConfigurationError> {
    facts.validate()?;

    let neighbors: HashMap<&str, _> = facts
        .routers()
        .into_iter()
        .map(|r| (r, facts.neighbors(r)))
        .collect();

    let mut routes = BTreeMap::new();
    for router in facts.routers() {
        let first_hops = first_hops(router, &neighbors);
        let own_subnets: HashSet<_> = facts
            .host_subnets
            .iter()
            .filter(|h| h.router == router)
            .map(|h| h.subnet)
            .collect();

        let mut router_routes: Vec<Route> = Vec::new();
        for host_subnet in &facts.host_subnets {
            if own_subnets.contains(&host_subnet.subnet)
                || router_routes
                    .iter()
                    .any(|r| r.destination == host_subnet.subnet)
            {
                continue;
            }

            let Some(first_hop) = first_hops.get(host_subnet.router.as_str()) else {
                return Err(ConfigurationError::UnreachableSubnet {
                    router: router.to_string(),
                    subnet: host_subnet.subnet,
                    owner: host_subnet.router.clone(),
                });
            };

            let next = neighbors[router][first_hop];
            router_routes.push(Route::new(host_subnet.subnet, next));
        }

        router_routes.sort();
        routes.insert(router.to_string(), router_routes);
    }

    Ok(RoutingPlan { routes })
}

/// Breadth-first search from `source`, returning for every reachable router the neighbor of
/// `source` through which it is reached
fn first_hops<'a>(
    source: &'a str,
    neighbors: &HashMap<&'a str, BTreeMap<&'a str, Ipv4Addr>>,
) -> HashMap<&'a str, &'a str> {
    let mut first_hops = HashMap::new();
    let mut visited = HashSet::from([source]);
    let mut queue = VecDeque::new();

    for &neighbor in neighbors[source].keys() {
        if visited.insert(neighbor) {
            first_hops.insert(neighbor, neighbor);
            queue.push_back(neighbor);
        }
    }

    while let Some(current) = queue.pop_front() {
        let via = first_hops[current];
        for &next in neighbors[current].keys() {
            if visited.insert(next) {
                first_hops.insert(next, via);
                queue.push_back(next);
            }
        }
    }

    first_hops
}
