use std::collections::VecDeque;

const UNVISITED: u32 = u32::MAX;

struct Component {
    label: u16,
    pixels: Vec<u32>,
}

/// Makes every label a single 4-connected region.
///
/// The largest component of each label keeps it. Every other fragment takes
/// the label of an adjacent region that is already settled, so no new labels
/// are introduced.
pub fn enforce_connectivity(labels: &mut [u16], width: u32, height: u32) {
    let (components, owner) = label_components(labels, width, height);

    let mut largest: Vec<Option<usize>> = vec![None; usize::from(u16::MAX) + 1];
    for (idx, comp) in components.iter().enumerate() {
        let slot = usize::from(comp.label);
        let bigger = match largest[slot] {
            Some(best) => components[best].pixels.len() < comp.pixels.len(),
            None => true,
        };
        if bigger {
            largest[slot] = Some(idx);
        }
    }

    let mut settled_label: Vec<Option<u16>> = components
        .iter()
        .enumerate()
        .map(|(idx, comp)| (largest[usize::from(comp.label)] == Some(idx)).then_some(comp.label))
        .collect();

    let mut pending: Vec<usize> = (0..components.len())
        .filter(|idx| settled_label[*idx].is_none())
        .collect();

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|&idx| {
            let adopted = components[idx].pixels.iter().find_map(|&p| {
                neighbours(p, width, height)
                    .filter_map(|n| {
                        let other = owner[n as usize] as usize;
                        (other != idx).then_some(settled_label[other]).flatten()
                    })
                    .next()
            });
            match adopted {
                Some(label) => {
                    settled_label[idx] = Some(label);
                    false
                }
                None => true,
            }
        });
        if pending.len() == before {
            break;
        }
    }

    for (idx, comp) in components.iter().enumerate() {
        if let Some(label) = settled_label[idx] {
            for &p in &comp.pixels {
                labels[p as usize] = label;
            }
        }
    }
}

fn label_components(labels: &[u16], width: u32, height: u32) -> (Vec<Component>, Vec<u32>) {
    let mut owner = vec![UNVISITED; labels.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..labels.len() {
        if owner[start] != UNVISITED {
            continue;
        }
        let id = components.len() as u32;
        let label = labels[start];
        let mut pixels = Vec::new();
        owner[start] = id;
        queue.push_back(start as u32);

        while let Some(p) = queue.pop_front() {
            pixels.push(p);
            for n in neighbours(p, width, height) {
                let n = n as usize;
                if owner[n] == UNVISITED && labels[n] == label {
                    owner[n] = id;
                    queue.push_back(n as u32);
                }
            }
        }
        components.push(Component { label, pixels });
    }

    (components, owner)
}

fn neighbours(p: u32, width: u32, height: u32) -> impl Iterator<Item = u32> {
    let (x, y) = (p % width, p / width);
    [
        (x > 0).then(|| p - 1),
        (x + 1 < width).then(|| p + 1),
        (y > 0).then(|| p - width),
        (y + 1 < height).then(|| p + width),
    ]
    .into_iter()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_components(labels: &[u16], width: u32, height: u32) -> usize {
        label_components(labels, width, height).0.len()
    }

    #[test]
    fn test_fragment_is_merged_into_neighbour() {
        #[rustfmt::skip]
        let mut labels = vec![
            0, 0, 1, 1,
            0, 0, 1, 1,
            1, 0, 1, 1,
        ];
        enforce_connectivity(&mut labels, 4, 3);

        assert_eq!(labels[8], 0);
        assert_eq!(count_components(&labels, 4, 3), 2);
    }

    #[test]
    fn test_connected_labels_are_untouched() {
        #[rustfmt::skip]
        let original = vec![
            0, 0, 1,
            2, 2, 1,
            2, 2, 1,
        ];
        let mut labels = original.clone();
        enforce_connectivity(&mut labels, 3, 3);
        assert_eq!(labels, original);
    }

    #[test]
    fn test_nested_fragments_settle() {
        // label 2 appears twice; its small copy sits inside label 1's orphan
        #[rustfmt::skip]
        let mut labels = vec![
            0, 0, 0, 0, 0,
            0, 1, 1, 1, 0,
            0, 1, 2, 1, 0,
            0, 1, 1, 1, 0,
            0, 0, 0, 0, 0,
            1, 2, 2, 2, 2,
        ];
        enforce_connectivity(&mut labels, 5, 6);

        let mut distinct: Vec<u16> = labels.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(count_components(&labels, 5, 6), distinct.len());
    }
}
