//! 락 순서 그래프 기반 데드락 감지기
//!
//! 모든 락 획득 시 [`DeadlockProfiler::push_lock`], 해제 시 [`DeadlockProfiler::pop_lock`] 이
//! 호출됩니다. 스레드가 락 A 를 쥔 채 락 B 를 잡으면 A→B 간선이 처음 한 번 기록되고,
//! 새 간선이 생길 때마다 전체 그래프에서 사이클을 검사합니다.
//! 사이클(잠재적 데드락), 같은 락 재귀 획득, 짝이 맞지 않는 해제는 모두 치명적입니다.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use crate::error::fatal;

static NEXT_PROFILER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// 프로파일러별 현재 스레드의 락 스택
    static LOCK_STACKS: RefCell<HashMap<u64, Vec<usize>>> = RefCell::new(HashMap::new());
}

/// 현재 스레드의 모든 락 스택을 비우고, 남아 있던 락 수를 반환합니다.
pub(crate) fn clear_thread_lock_stacks() -> usize {
    LOCK_STACKS
        .try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let held = stacks.values().map(Vec::len).sum();
            stacks.clear();
            held
        })
        .unwrap_or(0)
}

#[derive(Default)]
struct LockGraph {
    name_to_id: HashMap<String, usize>,
    id_to_name: Vec<String>,
    edges: HashMap<usize, BTreeSet<usize>>,
}

/// DFS 작업 상태 (노드 수만큼 매번 새로 만듦)
struct CycleSearch {
    discovered_order: Vec<Option<usize>>,
    finished: Vec<bool>,
    parent: Vec<Option<usize>>,
    order: usize,
}

impl LockGraph {
    fn resolve(&mut self, name: &str) -> usize {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.id_to_name.len();
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.push(name.to_string());
        id
    }

    fn find_cycle(&self) -> Option<Vec<usize>> {
        let count = self.id_to_name.len();
        let mut search = CycleSearch {
            discovered_order: vec![None; count],
            finished: vec![false; count],
            parent: vec![None; count],
            order: 0,
        };

        for start in 0..count {
            if search.discovered_order[start].is_none() {
                if let Some(cycle) = self.dfs(start, &mut search) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs(&self, here: usize, search: &mut CycleSearch) -> Option<Vec<usize>> {
        let here_order = search.order;
        search.discovered_order[here] = Some(here_order);
        search.order += 1;

        if let Some(nexts) = self.edges.get(&here) {
            for &there in nexts {
                match search.discovered_order[there] {
                    None => {
                        search.parent[there] = Some(here);
                        if let Some(cycle) = self.dfs(there, search) {
                            return Some(cycle);
                        }
                    }
                    // 순방향 간선
                    Some(there_order) if there_order > here_order => continue,
                    // 아직 끝나지 않은 조상으로 가는 역방향 간선 = 사이클
                    Some(_) if !search.finished[there] => {
                        return Some(Self::reconstruct(here, there, &search.parent));
                    }
                    // 교차 간선
                    Some(_) => continue,
                }
            }
        }

        search.finished[here] = true;
        None
    }

    /// there → ... → here → there 경로 복원
    fn reconstruct(here: usize, there: usize, parent: &[Option<usize>]) -> Vec<usize> {
        let mut path = vec![here];
        let mut now = here;
        while now != there {
            match parent[now] {
                Some(p) => {
                    path.push(p);
                    now = p;
                }
                None => break,
            }
        }
        path.reverse();
        path.push(there);
        path
    }

    fn describe(&self, path: &[usize]) -> String {
        path.iter()
            .map(|&id| self.id_to_name[id].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// 데드락 프로파일러
///
/// 전역 싱글톤이 아니라 애플리케이션 컨텍스트가 소유하며, 락 생성 시 주입됩니다.
pub struct DeadlockProfiler {
    id: u64,
    graph: Mutex<LockGraph>,
}

impl Default for DeadlockProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadlockProfiler {
    pub fn new() -> Self {
        Self {
            id: NEXT_PROFILER_ID.fetch_add(1, Ordering::Relaxed),
            graph: Mutex::new(LockGraph::default()),
        }
    }

    /// 락 획득 기록
    pub fn push_lock(&self, name: &str) {
        let mut graph = self.graph.lock();
        let lock_id = graph.resolve(name);

        let previous = LOCK_STACKS.with(|stacks| {
            stacks
                .borrow()
                .get(&self.id)
                .and_then(|stack| stack.last().copied())
        });

        if let Some(prev_id) = previous {
            if prev_id == lock_id {
                drop(graph);
                fatal(&format!("같은 락의 재귀 획득: {name}"));
            }

            let inserted = graph.edges.entry(prev_id).or_default().insert(lock_id);
            if inserted {
                debug!(
                    "락 순서 간선 추가: {} -> {}",
                    graph.id_to_name[prev_id], name
                );
                if let Some(cycle) = graph.find_cycle() {
                    let description = graph.describe(&cycle);
                    // 그래프는 항상 비순환으로 유지
                    if let Some(nexts) = graph.edges.get_mut(&prev_id) {
                        nexts.remove(&lock_id);
                    }
                    drop(graph);
                    error!("데드락 사이클 감지: {}", description);
                    fatal(&format!("데드락 사이클 감지: {description}"));
                }
            }
        }

        LOCK_STACKS.with(|stacks| {
            stacks.borrow_mut().entry(self.id).or_default().push(lock_id);
        });
    }

    /// 락 해제 기록
    pub fn pop_lock(&self, name: &str) {
        let lock_id = match self.graph.lock().name_to_id.get(name) {
            Some(&id) => id,
            None => fatal(&format!("등록되지 않은 락 해제: {name}")),
        };

        let top = LOCK_STACKS.with(|stacks| {
            stacks
                .borrow_mut()
                .get_mut(&self.id)
                .and_then(|stack| stack.pop())
        });

        match top {
            None => fatal(&format!("락 스택이 비어 있는데 해제 시도: {name}")),
            Some(top_id) if top_id != lock_id => {
                fatal(&format!("락 해제 순서 불일치: {name}"))
            }
            Some(_) => {}
        }
    }

    /// 현재 스레드가 이 프로파일러 기준으로 쥐고 있는 락 수
    pub fn held_by_current_thread(&self) -> usize {
        LOCK_STACKS.with(|stacks| stacks.borrow().get(&self.id).map_or(0, Vec::len))
    }

    /// 등록된 락 종류 수
    pub fn lock_count(&self) -> usize {
        self.graph.lock().id_to_name.len()
    }

    /// 기록된 락 순서 간선 수
    pub fn edge_count(&self) -> usize {
        self.graph.lock().edges.values().map(BTreeSet::len).sum()
    }
}
